//! Connection Workers
//!
//! One outbound (connect) and one inbound (accept) worker may run at a time.
//! Each runs as its own task, registers the connection it establishes, and can
//! be cancelled explicitly through its [`WorkerHandle`].

pub mod accept;
pub mod connect;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connection::ConnectionRegistry;
use crate::events::EventQueue;
use crate::metrics::Metrics;
use crate::transport::Transport;

pub use accept::AcceptWorker;
pub use connect::ConnectWorker;

/// Everything a worker needs to register a connection and report on it
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<ConnectionRegistry>,
    pub transport: Arc<dyn Transport>,
    pub events: Arc<EventQueue>,
    pub metrics: Arc<Metrics>,
}

/// Lifecycle of a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Connecting,
    Listening { channel: u16 },
    Connected { connection_id: String },
    Accepted { connection_id: String },
    Failed { reason: String },
    Cancelled,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::Connected { .. }
                | WorkerState::Accepted { .. }
                | WorkerState::Failed { .. }
                | WorkerState::Cancelled
        )
    }
}

/// Handle to a spawned worker
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    channel: Option<u16>,
    state_rx: watch::Receiver<WorkerState>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    fn new(
        name: &'static str,
        channel: Option<u16>,
        state_rx: watch::Receiver<WorkerState>,
        cancel_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            channel,
            state_rx,
            cancel_tx,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Listening channel (PSM) of an accept worker
    pub fn channel(&self) -> Option<u16> {
        self.channel
    }

    pub fn state(&self) -> WorkerState {
        self.state_rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the worker to stop; a pending connect or accept is abandoned
    pub fn cancel(&self) {
        if !self.is_finished() {
            debug!("Cancelling {} worker", self.name);
            self.cancel_tx.send_replace(true);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_rx.clone()
    }
}

/// Wait on a worker's state channel until it reaches a terminal state
pub async fn wait_terminal(mut state_rx: watch::Receiver<WorkerState>) -> WorkerState {
    let terminal = state_rx
        .wait_for(WorkerState::is_terminal)
        .await
        .map(|state| state.clone())
        .ok();
    terminal.unwrap_or_else(|| state_rx.borrow().clone())
}

/// Resolves once cancellation is requested; never resolves if the handle is gone
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    if cancel_rx.wait_for(|cancel| *cancel).await.is_err() {
        std::future::pending::<()>().await;
    }
}
