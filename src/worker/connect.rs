//! Outbound Connect Worker

use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::{cancelled, WorkerContext, WorkerHandle, WorkerState};
use crate::connection::{ConnectionRecord, Direction};
use crate::events::{CONNECT_ERROR, CONNECT_SUCCESS};
use crate::transport::ConnectTarget;

/// Connects to one remote endpoint and registers the result
pub struct ConnectWorker;

impl ConnectWorker {
    /// Spawn a worker connecting to `target`, giving up after `timeout`
    pub fn spawn(ctx: WorkerContext, target: ConnectTarget, timeout: Duration) -> WorkerHandle {
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = tokio::spawn(run(ctx, target, timeout, state_tx, cancel_rx));
        WorkerHandle::new("connect", None, state_rx, cancel_tx, task)
    }
}

#[instrument(skip(ctx, timeout, state_tx, cancel_rx), fields(address = %target.address, kind = %target.kind))]
async fn run(
    ctx: WorkerContext,
    target: ConnectTarget,
    timeout: Duration,
    state_tx: watch::Sender<WorkerState>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    state_tx.send_replace(WorkerState::Connecting);

    if let Err(e) = ctx.transport.cancel_discovery().await {
        warn!("Failed to cancel discovery before connecting: {}", e);
    }

    let outcome = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => None,
        result = tokio::time::timeout(timeout, ctx.transport.connect(&target)) => Some(result),
    };

    let failure = match outcome {
        None => {
            info!("Connect to {} cancelled", target.address);
            state_tx.send_replace(WorkerState::Cancelled);
            return;
        }
        Some(Ok(Ok((stream, remote)))) => {
            let record = ConnectionRecord::new(stream, remote.clone(), target.kind.clone(), Direction::Outbound);
            let connection_id = ctx.registry.add(record).await;
            ctx.metrics.connection_opened();
            ctx.events.post(
                CONNECT_SUCCESS,
                json!({ "connectionId": connection_id, "address": remote }),
            );
            info!("Outbound connection {} established", connection_id);
            state_tx.send_replace(WorkerState::Connected { connection_id });
            return;
        }
        Some(Ok(Err(e))) => format!("Connect to {} failed: {}", target.address, e),
        Some(Err(_)) => format!("Connect to {} timed out after {:?}", target.address, timeout),
    };

    warn!("{}", failure);
    ctx.metrics.record_worker_failure();
    ctx.events.post(
        CONNECT_ERROR,
        json!({ "address": target.address, "error": failure }),
    );
    state_tx.send_replace(WorkerState::Failed { reason: failure });
}
