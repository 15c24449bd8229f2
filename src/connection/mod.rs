//! Connection Management Module
//!
//! Tracks open socket connections and their lifecycle.

pub mod record;
pub mod registry;

pub use record::{ConnectionInfo, ConnectionRecord, ConnectionState, Direction};
pub use registry::ConnectionRegistry;
