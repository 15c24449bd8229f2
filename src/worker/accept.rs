//! Inbound Accept Worker

use std::io;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::{cancelled, WorkerContext, WorkerHandle, WorkerState};
use crate::connection::{ConnectionRecord, Direction};
use crate::error::SocketResult;
use crate::events::{ACCEPT_ERROR, ACCEPT_SUCCESS};
use crate::transport::{ListenSpec, SocketKind, SocketListener};

/// Listens for one inbound connection and registers it
pub struct AcceptWorker;

impl AcceptWorker {
    /// Open a listener for `spec` and spawn the accept task. A zero `timeout`
    /// waits indefinitely.
    pub async fn start(
        ctx: WorkerContext,
        spec: ListenSpec,
        timeout: Duration,
    ) -> SocketResult<WorkerHandle> {
        let listener = match ctx.transport.listen(&spec).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!("Failed to open listener for {:?}: {}", spec, e);
                ctx.metrics.record_worker_failure();
                ctx.events.post(ACCEPT_ERROR, json!({ "error": e.to_string() }));
                return Err(e.into());
            }
        };

        let channel = listener.channel();
        let (state_tx, state_rx) = watch::channel(WorkerState::Listening { channel });
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = tokio::spawn(run(ctx, spec, listener, timeout, state_tx, cancel_rx));
        Ok(WorkerHandle::new("accept", Some(channel), state_rx, cancel_tx, task))
    }
}

fn socket_kind(spec: &ListenSpec, channel: u16) -> SocketKind {
    match spec {
        ListenSpec::Rfcomm { service_uuid } => SocketKind::Rfcomm {
            service_uuid: service_uuid.clone(),
        },
        ListenSpec::L2cap { le, secure } => SocketKind::L2cap {
            psm: channel,
            le: *le,
            secure: *secure,
        },
    }
}

#[instrument(skip(ctx, listener, timeout, state_tx, cancel_rx), fields(channel = listener.channel()))]
async fn run(
    ctx: WorkerContext,
    spec: ListenSpec,
    mut listener: Box<dyn SocketListener>,
    timeout: Duration,
    state_tx: watch::Sender<WorkerState>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let channel = listener.channel();
    info!("Waiting for inbound connection on channel {} (timeout: {:?})", channel, timeout);

    let accept = async {
        if timeout.is_zero() {
            listener.accept().await
        } else {
            match tokio::time::timeout(timeout, listener.accept()).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("No connection within {:?}", timeout),
                )),
            }
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => None,
        result = accept => Some(result),
    };

    let failure = match outcome {
        None => {
            info!("Accept on channel {} cancelled", channel);
            state_tx.send_replace(WorkerState::Cancelled);
            return;
        }
        Some(Ok((stream, remote))) => {
            let kind = socket_kind(&spec, channel);
            let record = ConnectionRecord::new(stream, remote.clone(), kind, Direction::Inbound);
            let connection_id = ctx.registry.add(record).await;
            ctx.metrics.connection_opened();
            ctx.events.post(
                ACCEPT_SUCCESS,
                json!({ "connectionId": connection_id, "address": remote }),
            );
            info!("Inbound connection {} accepted from {}", connection_id, remote);
            state_tx.send_replace(WorkerState::Accepted { connection_id });
            return;
        }
        Some(Err(e)) => format!("Accept on channel {} failed: {}", channel, e),
    };

    warn!("{}", failure);
    ctx.metrics.record_worker_failure();
    ctx.events.post(ACCEPT_ERROR, json!({ "channel": channel, "error": failure }));
    state_tx.send_replace(WorkerState::Failed { reason: failure });
}
