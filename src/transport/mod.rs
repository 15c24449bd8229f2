//! Transport Module
//!
//! The seam between the socket facade and whatever actually carries bytes.
//! A transport opens outbound streams and listening endpoints for the two
//! socket flavours the facade knows about: RFCOMM (addressed by a service
//! UUID) and L2CAP (addressed by a PSM).

pub mod directory;
pub mod tcp;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

pub use directory::ServiceDirectory;
pub use tcp::TcpTransport;

/// A connected, bidirectional byte stream
pub trait SocketStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T> SocketStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

/// Boxed stream handed from a transport to the connection registry
pub type BoxedStream = Box<dyn SocketStream>;

/// Socket flavour and its addressing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketKind {
    Rfcomm { service_uuid: String },
    L2cap { psm: u16, le: bool, secure: bool },
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketKind::Rfcomm { service_uuid } => write!(f, "RFCOMM({})", service_uuid),
            SocketKind::L2cap { psm, le, secure } => write!(
                f,
                "L2CAP(psm={}, {}, {})",
                psm,
                if *le { "le" } else { "classic" },
                if *secure { "secure" } else { "insecure" }
            ),
        }
    }
}

/// Where an outbound worker should connect
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub address: String,
    pub kind: SocketKind,
}

/// What an inbound worker should listen for
#[derive(Debug, Clone)]
pub enum ListenSpec {
    Rfcomm { service_uuid: String },
    /// The PSM is allocated by the transport
    L2cap { le: bool, secure: bool },
}

/// A listening endpoint waiting for inbound connections
#[async_trait]
pub trait SocketListener: Send + Sync {
    /// RFCOMM channel or L2CAP PSM the listener is reachable on
    fn channel(&self) -> u16;

    /// Wait for one inbound connection; returns the stream and the remote address
    async fn accept(&mut self) -> io::Result<(BoxedStream, String)>;
}

/// Opens outbound and inbound socket endpoints
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stop any running device discovery before connecting
    async fn cancel_discovery(&self) -> io::Result<()> {
        Ok(())
    }

    /// Connect to a remote endpoint; returns the stream and the remote address
    async fn connect(&self, target: &ConnectTarget) -> io::Result<(BoxedStream, String)>;

    /// Open a listening endpoint
    async fn listen(&self, spec: &ListenSpec) -> io::Result<Box<dyn SocketListener>>;
}
