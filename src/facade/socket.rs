//! Socket Connection Facade
//!
//! The operations remote callers reach: start and cancel the connect/accept
//! workers, and perform I/O on a connection chosen by identifier (or the only
//! connection, when no identifier is given). Any I/O failure closes the
//! connection and drops it from the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::throughput;
use crate::config::{Config, SocketConfig};
use crate::connection::{ConnectionInfo, ConnectionRecord, ConnectionRegistry};
use crate::error::{SocketError, SocketResult};
use crate::events::{EventQueue, CONNECTION_LOST};
use crate::metrics::Metrics;
use crate::transport::{ConnectTarget, ListenSpec, SocketKind, TcpTransport, Transport};
use crate::worker::{
    wait_terminal, AcceptWorker, ConnectWorker, WorkerContext, WorkerHandle, WorkerState,
};

/// Socket connection facade
pub struct SocketFacade {
    ctx: WorkerContext,
    config: SocketConfig,
    connect_worker: Mutex<Option<WorkerHandle>>,
    accept_worker: Mutex<Option<WorkerHandle>>,
}

impl SocketFacade {
    /// Create a facade over an arbitrary transport
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        events: Arc<EventQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let ctx = WorkerContext {
            registry: Arc::new(ConnectionRegistry::new()),
            transport,
            events,
            metrics,
        };

        Self {
            ctx,
            config: config.socket.clone(),
            connect_worker: Mutex::new(None),
            accept_worker: Mutex::new(None),
        }
    }

    /// Create a facade over the TCP transport described by `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config,
            Arc::new(TcpTransport::from_config(&config.transport)),
            Arc::new(EventQueue::new(config.events.capacity)),
            Arc::new(Metrics::new()),
        )
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.ctx.registry
    }

    pub fn events(&self) -> &Arc<EventQueue> {
        &self.ctx.events
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------

    /// Start an RFCOMM connect worker towards `address`
    pub async fn begin_connect_uuid(&self, address: &str, uuid: &str) -> SocketResult<()> {
        let target = ConnectTarget {
            address: parse_address(address)?,
            kind: SocketKind::Rfcomm {
                service_uuid: parse_uuid(uuid)?,
            },
        };
        self.spawn_connect(target).await
    }

    /// Start an L2CAP connect worker towards `address`
    pub async fn begin_connect_psm(
        &self,
        address: &str,
        le: bool,
        psm: u16,
        secure: bool,
    ) -> SocketResult<()> {
        if psm == 0 {
            return Err(SocketError::InvalidArgument("psm must be non-zero".to_string()));
        }
        let target = ConnectTarget {
            address: parse_address(address)?,
            kind: SocketKind::L2cap { psm, le, secure },
        };
        self.spawn_connect(target).await
    }

    /// Start an RFCOMM accept worker; `timeout_ms == 0` uses the configured default
    pub async fn begin_accept_uuid(&self, uuid: &str, timeout_ms: u64) -> SocketResult<()> {
        let spec = ListenSpec::Rfcomm {
            service_uuid: parse_uuid(uuid)?,
        };
        self.spawn_accept(spec, timeout_ms).await
    }

    /// Start an L2CAP accept worker; the PSM is allocated by the transport
    pub async fn begin_accept_psm(&self, timeout_ms: u64, le: bool, secure: bool) -> SocketResult<()> {
        self.spawn_accept(ListenSpec::L2cap { le, secure }, timeout_ms).await
    }

    /// Channel (PSM) of the most recent listener
    pub async fn psm(&self) -> SocketResult<u16> {
        self.accept_worker
            .lock()
            .await
            .as_ref()
            .and_then(WorkerHandle::channel)
            .ok_or(SocketError::NoListener)
    }

    pub async fn connect_worker_state(&self) -> Option<WorkerState> {
        self.connect_worker.lock().await.as_ref().map(WorkerHandle::state)
    }

    pub async fn accept_worker_state(&self) -> Option<WorkerState> {
        self.accept_worker.lock().await.as_ref().map(WorkerHandle::state)
    }

    /// Wait for the current connect worker to finish
    pub async fn wait_connect_worker(&self) -> Option<WorkerState> {
        let state_rx = self.connect_worker.lock().await.as_ref().map(WorkerHandle::subscribe)?;
        Some(wait_terminal(state_rx).await)
    }

    /// Wait for the current accept worker to finish
    pub async fn wait_accept_worker(&self) -> Option<WorkerState> {
        let state_rx = self.accept_worker.lock().await.as_ref().map(WorkerHandle::subscribe)?;
        Some(wait_terminal(state_rx).await)
    }

    pub async fn end_connect_worker(&self) {
        if let Some(handle) = self.connect_worker.lock().await.as_ref() {
            handle.cancel();
        }
    }

    pub async fn end_accept_worker(&self) {
        if let Some(handle) = self.accept_worker.lock().await.as_ref() {
            handle.cancel();
        }
    }

    /// Cancel both workers
    pub async fn kill_workers(&self) {
        self.end_accept_worker().await;
        self.end_connect_worker().await;
    }

    async fn spawn_connect(&self, target: ConnectTarget) -> SocketResult<()> {
        let mut slot = self.connect_worker.lock().await;
        if let Some(running) = slot.as_ref().filter(|handle| !handle.is_finished()) {
            return Err(SocketError::WorkerBusy(running.name()));
        }

        info!("Starting connect worker for {} ({})", target.address, target.kind);
        *slot = Some(ConnectWorker::spawn(
            self.ctx.clone(),
            target,
            self.config.connect_timeout,
        ));
        Ok(())
    }

    async fn spawn_accept(&self, spec: ListenSpec, timeout_ms: u64) -> SocketResult<()> {
        let mut slot = self.accept_worker.lock().await;
        if let Some(running) = slot.as_ref().filter(|handle| !handle.is_finished()) {
            return Err(SocketError::WorkerBusy(running.name()));
        }

        let timeout = if timeout_ms == 0 {
            self.config.default_accept_timeout
        } else {
            Duration::from_millis(timeout_ms)
        };

        info!("Starting accept worker for {:?} (timeout: {:?})", spec, timeout);
        *slot = Some(AcceptWorker::start(self.ctx.clone(), spec, timeout).await?);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connection operations
    // ------------------------------------------------------------------

    /// Identifier -> remote address of every open connection
    pub async fn active_connections(&self) -> HashMap<String, String> {
        self.ctx.registry.list().await
    }

    pub async fn connection_info(&self) -> Vec<ConnectionInfo> {
        self.ctx.registry.info().await
    }

    /// Write text to a connection
    pub async fn write(&self, text: &str, id: &str) -> SocketResult<()> {
        let record = self.ctx.registry.resolve(id).await?;
        let result = record.write_all(text.as_bytes()).await;
        self.settle(&record, result).await?;
        self.ctx.metrics.record_write(text.len());
        Ok(())
    }

    /// Write base64-encoded bytes to a connection
    pub async fn write_binary(&self, base64: &str, id: &str) -> SocketResult<()> {
        let data = general_purpose::STANDARD
            .decode(base64.trim())
            .map_err(|e| SocketError::InvalidArgument(format!("Invalid base64 payload: {}", e)))?;

        let record = self.ctx.registry.resolve(id).await?;
        let result = record.write_all(&data).await;
        self.settle(&record, result).await?;
        self.ctx.metrics.record_write(data.len());
        Ok(())
    }

    /// Read up to `buffer_size` bytes as text
    pub async fn read(&self, buffer_size: Option<usize>, id: &str) -> SocketResult<String> {
        let data = self.read_bytes(buffer_size, id).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Read up to `buffer_size` bytes, base64-encoded
    pub async fn read_binary(&self, buffer_size: Option<usize>, id: &str) -> SocketResult<String> {
        let data = self.read_bytes(buffer_size, id).await?;
        Ok(general_purpose::STANDARD.encode(data))
    }

    /// Read one line, without its terminator
    pub async fn read_line(&self, id: &str) -> SocketResult<String> {
        let record = self.ctx.registry.resolve(id).await?;
        let result = record.read_line(self.config.max_line_length).await;
        let line = self.settle(&record, result).await?;
        self.ctx.metrics.record_read(line.len());
        Ok(line)
    }

    /// Whether the connection has data waiting
    pub async fn read_ready(&self, id: &str) -> SocketResult<bool> {
        let record = self.ctx.registry.resolve(id).await?;
        let result = record.read_ready().await;
        self.settle(&record, result).await
    }

    /// Send a throughput pattern; returns bytes per second
    pub async fn throughput_send(
        &self,
        num_buffers: usize,
        buffer_size: usize,
        id: &str,
    ) -> SocketResult<u64> {
        let record = self.ctx.registry.resolve(id).await?;
        let result = throughput::send(&record, num_buffers, buffer_size).await;
        let rate = self.settle(&record, result).await?;
        self.ctx.metrics.record_write(num_buffers * buffer_size);
        self.ctx.metrics.record_throughput(rate);
        Ok(rate)
    }

    /// Receive and verify a throughput pattern; returns bytes per second
    pub async fn throughput_read(
        &self,
        num_buffers: usize,
        buffer_size: usize,
        id: &str,
    ) -> SocketResult<u64> {
        let record = self.ctx.registry.resolve(id).await?;
        let result = throughput::read(&record, num_buffers, buffer_size).await;
        let rate = self.settle(&record, result).await?;
        self.ctx.metrics.record_read(num_buffers * buffer_size);
        self.ctx.metrics.record_throughput(rate);
        Ok(rate)
    }

    /// Close and remove a connection; also cancels both workers
    pub async fn stop(&self, id: &str) -> SocketResult<()> {
        self.kill_workers().await;

        let record = self.ctx.registry.resolve(id).await?;
        record.close().await;
        if self.ctx.registry.remove(record.id()).await.is_some() {
            self.ctx.metrics.connection_closed();
        }

        info!("Stopped connection {} to {}", record.id(), record.remote_address());
        Ok(())
    }

    /// Cancel workers and close every connection
    pub async fn shutdown(&self) {
        info!("Shutting down socket facade");
        self.kill_workers().await;

        let closed = self.ctx.registry.clear().await;
        for _ in 0..closed {
            self.ctx.metrics.connection_closed();
        }
    }

    async fn read_bytes(&self, buffer_size: Option<usize>, id: &str) -> SocketResult<Vec<u8>> {
        let buffer_size = buffer_size.unwrap_or(self.config.default_buffer_size);
        if buffer_size == 0 || buffer_size > throughput::MAX_BUFFER_SIZE {
            return Err(SocketError::InvalidArgument(format!(
                "bufferSize must be between 1 and {}",
                throughput::MAX_BUFFER_SIZE
            )));
        }

        let record = self.ctx.registry.resolve(id).await?;
        let result = record.read_some(buffer_size).await;
        let data = self.settle(&record, result).await?;
        self.ctx.metrics.record_read(data.len());
        Ok(data)
    }

    /// Pass a result through, invalidating the connection on I/O failure
    async fn settle<T>(
        &self,
        record: &ConnectionRecord,
        result: SocketResult<T>,
    ) -> SocketResult<T> {
        if let Err(e) = &result {
            if e.is_io() {
                self.invalidate(record, e).await;
            }
        }
        result
    }

    async fn invalidate(&self, record: &ConnectionRecord, cause: &SocketError) {
        warn!(
            "Connection {} to {} failed: {}; removing it",
            record.id(),
            record.remote_address(),
            cause
        );
        record.close().await;

        if self.ctx.registry.remove(record.id()).await.is_some() {
            self.ctx.metrics.connection_closed();
            self.ctx.metrics.record_io_failure();
            self.ctx.events.post(
                CONNECTION_LOST,
                json!({
                    "connectionId": record.id(),
                    "address": record.remote_address(),
                    "error": cause.to_string(),
                }),
            );
        } else {
            debug!("Connection {} was already removed", record.id());
        }
    }
}

fn parse_uuid(uuid: &str) -> SocketResult<String> {
    uuid::Uuid::parse_str(uuid.trim())
        .map(|parsed| parsed.hyphenated().to_string())
        .map_err(|e| SocketError::InvalidArgument(format!("Invalid UUID '{}': {}", uuid, e)))
}

fn parse_address(address: &str) -> SocketResult<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(SocketError::InvalidArgument("address must not be empty".to_string()));
    }
    Ok(address.to_string())
}
