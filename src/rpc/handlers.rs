//! RPC Handlers

use super::dispatch::Dispatcher;
use super::types::*;
use crate::connection::ConnectionInfo;
use crate::metrics::Metrics;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::warn;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub metrics: Arc<Metrics>,
    pub metrics_enabled: bool,
    pub start_time: SystemTime,
}

/// Health check handler
pub async fn health_check() -> Json<ApiResponse<HealthStatus>> {
    let mut checks = HashMap::new();
    checks.insert(
        "server".to_string(),
        CheckResult {
            status: "healthy".to_string(),
            message: Some("RPC server is running".to_string()),
        },
    );

    Json(ApiResponse::success(HealthStatus {
        status: "healthy".to_string(),
        checks,
        timestamp: SystemTime::now(),
    }))
}

/// Daemon status
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<ServerStatus>> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    let facade = state.dispatcher.facade();
    let status = ServerStatus {
        uptime_seconds: uptime,
        active_connections: facade.registry().len().await,
        total_connections: state.metrics.get_total_connections(),
        bytes_written: state.metrics.get_bytes_written(),
        bytes_read: state.metrics.get_bytes_read(),
        io_failures: state.metrics.get_io_failures(),
        pending_events: facade.events().len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(ApiResponse::success(status))
}

/// Invoke one RPC method
pub async fn rpc(
    State(state): State<AppState>,
    payload: Result<Json<RpcRequest>, JsonRejection>,
) -> Result<Json<RpcResponse>, (StatusCode, Json<ApiResponse<()>>)> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Malformed RPC request: {}", rejection.body_text());
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(rejection.body_text())),
        )
    })?;

    Ok(Json(state.dispatcher.handle(request).await))
}

/// Open connections
pub async fn get_connections(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ConnectionInfo>>> {
    let connections = state.dispatcher.facade().connection_info().await;
    Json(ApiResponse::success(connections))
}

/// Prometheus text exposition
pub async fn get_metrics(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
        .into_response()
}
