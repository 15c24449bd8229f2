//! RPC Module
//!
//! Named remote calls over HTTP/JSON, dispatched onto the socket facade.

pub mod api;
pub mod auth;
pub mod dispatch;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::RpcApi;
pub use auth::ApiAuth;
pub use dispatch::Dispatcher;
pub use server::RpcServer;
pub use types::*;
