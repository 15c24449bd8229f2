//! Socket Facade
//!
//! Connection-multiplexing operations exposed to remote callers.

pub mod socket;
pub mod throughput;

pub use socket::SocketFacade;
