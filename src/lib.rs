//! btsock Library
//!
//! Bluetooth socket connection facade: a registry of RFCOMM/L2CAP
//! connections, the workers that open them, and the remote-call surface test
//! harnesses use to drive them.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod facade;
pub mod metrics;
pub mod rpc;
pub mod shutdown;
pub mod transport;
pub mod worker;

pub use config::Config;
pub use connection::ConnectionRegistry;
pub use error::{SocketError, SocketResult};
pub use facade::SocketFacade;
pub use shutdown::ShutdownCoordinator;

/// Common error type for daemon plumbing
pub type Result<T> = anyhow::Result<T>;
