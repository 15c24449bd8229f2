//! TCP Transport
//!
//! Carries RFCOMM and L2CAP flavoured sockets over TCP. RFCOMM service UUIDs
//! resolve through the [`ServiceDirectory`]; L2CAP PSMs are TCP ports.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use super::{
    BoxedStream, ConnectTarget, ListenSpec, ServiceDirectory, SocketKind, SocketListener,
    Transport,
};
use super::directory::ServiceRecord;
use crate::config::TransportConfig;

/// Transport that maps Bluetooth sockets onto TCP connections
#[derive(Debug, Clone)]
pub struct TcpTransport {
    listen_host: String,
    peers: Arc<HashMap<String, String>>,
    directory: ServiceDirectory,
}

impl TcpTransport {
    /// Create a transport from configuration
    pub fn from_config(config: &TransportConfig) -> Self {
        let peers = config
            .peers
            .iter()
            .map(|(address, host)| (address.to_ascii_uppercase(), host.clone()))
            .collect();

        Self {
            listen_host: config.listen_host.clone(),
            peers: Arc::new(peers),
            directory: ServiceDirectory::new(config.services.clone()),
        }
    }

    /// Loopback transport with no peers or static records
    pub fn loopback() -> Self {
        Self {
            listen_host: "127.0.0.1".to_string(),
            peers: Arc::new(HashMap::new()),
            directory: ServiceDirectory::default(),
        }
    }

    /// The service directory used for RFCOMM lookups
    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    /// Resolve a remote address and socket kind to a TCP endpoint
    fn resolve_endpoint(&self, target: &ConnectTarget) -> io::Result<(String, u16)> {
        if let Ok(addr) = target.address.parse::<SocketAddr>() {
            return match &target.kind {
                SocketKind::Rfcomm { .. } => Ok((addr.ip().to_string(), addr.port())),
                SocketKind::L2cap { psm, .. } if *psm == addr.port() => {
                    Ok((addr.ip().to_string(), *psm))
                }
                SocketKind::L2cap { psm, .. } => Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Address {} disagrees with PSM {}", addr, psm),
                )),
            };
        }

        let host = self
            .peers
            .get(&target.address.to_ascii_uppercase())
            .cloned()
            .unwrap_or_else(|| target.address.clone());

        let port = match &target.kind {
            SocketKind::Rfcomm { service_uuid } => {
                self.directory.lookup(service_uuid).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("No service record for {}", service_uuid),
                    )
                })?
            }
            SocketKind::L2cap { psm, .. } => {
                if *psm == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "PSM 0 is not connectable",
                    ));
                }
                *psm
            }
        };

        Ok((host, port))
    }

    /// Map an inbound peer back to its configured Bluetooth address
    fn peer_name(&self, addr: &SocketAddr) -> String {
        let ip = addr.ip().to_string();
        self.peers
            .iter()
            .find(|(_, host)| **host == ip)
            .map(|(address, _)| address.clone())
            .unwrap_or_else(|| addr.to_string())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, target: &ConnectTarget) -> io::Result<(BoxedStream, String)> {
        let (host, port) = self.resolve_endpoint(target)?;
        debug!("Connecting {} to {}:{}", target.kind, host, port);

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;

        info!("Connected {} to {} via {}:{}", target.kind, target.address, host, port);
        Ok((Box::new(stream), target.address.clone()))
    }

    async fn listen(&self, spec: &ListenSpec) -> io::Result<Box<dyn SocketListener>> {
        let listener = TcpListener::bind((self.listen_host.as_str(), 0)).await?;
        let port = listener.local_addr()?.port();

        let record = match spec {
            ListenSpec::Rfcomm { service_uuid } => {
                Some(self.directory.register(service_uuid, port))
            }
            ListenSpec::L2cap { le, secure } => {
                debug!("Allocated PSM {} (le={}, secure={})", port, le, secure);
                None
            }
        };

        info!("Listening on {}:{} for {:?}", self.listen_host, port, spec);
        Ok(Box::new(TcpSocketListener {
            listener,
            channel: port,
            transport: self.clone(),
            _record: record,
        }))
    }
}

/// Listening TCP endpoint; withdraws its service record on drop
struct TcpSocketListener {
    listener: TcpListener,
    channel: u16,
    transport: TcpTransport,
    _record: Option<ServiceRecord>,
}

#[async_trait]
impl SocketListener for TcpSocketListener {
    fn channel(&self) -> u16 {
        self.channel
    }

    async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        let remote = self.transport.peer_name(&addr);
        debug!("Accepted connection from {} on channel {}", remote, self.channel);
        Ok((Box::new(stream), remote))
    }
}
