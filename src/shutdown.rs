//! Graceful Shutdown Handling
//!
//! Waits for SIGTERM/SIGINT, tells the RPC server to stop, then cancels the
//! workers and closes every open connection.

use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::facade::SocketFacade;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Future resolving once shutdown has been triggered
    pub fn signalled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.subscribe();
        async move {
            let _ = shutdown_rx.recv().await;
        }
    }

    /// Broadcast shutdown to every subscriber
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal: {}", e);
        }
    }

    /// Wait for SIGTERM, SIGINT or Ctrl+C, then trigger shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Cancel workers and close connections, bounded by the shutdown timeout
    pub async fn shutdown_facade(&self, facade: &SocketFacade) -> Result<()> {
        let start_time = Instant::now();
        let open = facade.registry().len().await;
        info!("Closing {} open connections (timeout: {:?})", open, self.timeout);

        if tokio::time::timeout(self.timeout, facade.shutdown()).await.is_err() {
            warn!(
                "Shutdown timeout reached after {:?} with {} connections still registered",
                start_time.elapsed(),
                facade.registry().len().await
            );
            return Ok(());
        }

        info!("Socket facade shut down in {:?}", start_time.elapsed());
        Ok(())
    }
}
