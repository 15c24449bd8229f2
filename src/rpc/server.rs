//! RPC Server

use super::{api::RpcApi, dispatch::Dispatcher, handlers::AppState, types::ApiAuthConfig};
use crate::{config::Config, facade::SocketFacade, Result};
use anyhow::Context;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tracing::{error, info};

/// HTTP server carrying the RPC surface
pub struct RpcServer {
    bind_addr: SocketAddr,
    app_state: AppState,
    auth_config: ApiAuthConfig,
}

impl RpcServer {
    pub fn new(config: &Config, facade: Arc<SocketFacade>) -> Self {
        let metrics = Arc::clone(facade.metrics());
        let app_state = AppState {
            dispatcher: Dispatcher::new(facade, config.events.default_wait_timeout),
            metrics,
            metrics_enabled: config.monitoring.metrics_enabled,
            start_time: SystemTime::now(),
        };

        Self {
            bind_addr: config.server.bind_addr,
            app_state,
            auth_config: config.monitoring.api_auth.clone(),
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting RPC server on {}", self.bind_addr);

        let app = RpcApi::create_router(self.app_state, self.auth_config);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind RPC server to {}", self.bind_addr))?;

        info!("RPC server listening on {}", listener.local_addr()?);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("RPC server error: {}", e);
            return Err(e.into());
        }

        info!("RPC server stopped");
        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        RpcApi::create_router(self.app_state.clone(), self.auth_config.clone())
    }
}
