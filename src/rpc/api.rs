//! RPC Routes

use super::{
    auth::{auth_middleware, ApiAuth},
    handlers::*,
    types::ApiAuthConfig,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// RPC router
pub struct RpcApi;

impl RpcApi {
    /// Create the RPC router; everything but `/health` sits behind auth
    pub fn create_router(state: AppState, auth_config: ApiAuthConfig) -> Router {
        let auth = Arc::new(ApiAuth::new(auth_config));

        let public_routes = Router::new().route("/health", get(health_check));

        let protected_routes = Router::new()
            .route("/rpc", post(rpc))
            .route("/status", get(get_status))
            .route("/connections", get(get_connections))
            .route("/metrics", get(get_metrics))
            .layer(middleware::from_fn_with_state(auth, auth_middleware))
            .with_state(state);

        Router::new()
            .nest("/api/v1", public_routes.merge(protected_routes))
            .layer(CorsLayer::permissive())
    }
}
