//! Socket Facade Errors
//!
//! Failures raised by the connection registry, the workers and the facade
//! operations. Startup and plumbing code keeps using `anyhow` through
//! [`crate::Result`].

use std::io;
use thiserror::Error;

/// Result alias for facade and registry operations
pub type SocketResult<T> = std::result::Result<T, SocketError>;

/// Errors surfaced by socket facade operations
#[derive(Error, Debug)]
pub enum SocketError {
    /// No connection registered under the given identifier
    #[error("Connection not found: {id}")]
    NotFound { id: String },

    /// No identifier supplied and the registry does not hold exactly one connection
    #[error("No connection id given and {count} connections are active")]
    AmbiguousOrNoConnection { count: usize },

    /// Socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection was closed before or during the operation
    #[error("Connection {id} is closed")]
    ConnectionClosed { id: String },

    /// Throughput buffer did not match the expected pattern
    #[error("Throughput data mismatch in buffer {buffer} at offset {offset}: expected {expected:#04x}, got {actual:#04x}")]
    ThroughputMismatch {
        buffer: usize,
        offset: usize,
        expected: u8,
        actual: u8,
    },

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A worker of the same direction is still running
    #[error("A {0} worker is already running")]
    WorkerBusy(&'static str),

    /// No listener has been opened yet
    #[error("No listening socket available")]
    NoListener,

    /// A bounded wait expired
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl SocketError {
    /// Whether the error is an I/O-style failure that invalidates a connection
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            SocketError::Io(_)
                | SocketError::ConnectionClosed { .. }
                | SocketError::ThroughputMismatch { .. }
        )
    }

    /// Whether the error came from resolving a connection
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            SocketError::NotFound { .. } | SocketError::AmbiguousOrNoConnection { .. }
        )
    }
}
