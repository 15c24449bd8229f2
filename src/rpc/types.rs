//! RPC Types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::SystemTime;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// A named remote call with positional parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Result of a remote call; exactly one of `result`/`error` is meaningful
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RpcResponse {
    pub id: Value,
    pub result: Value,
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn err(id: Value, message: String) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message),
        }
    }
}

/// Daemon status
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub total_connections: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub io_failures: u64,
    pub pending_events: usize,
    pub version: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub checks: HashMap<String, CheckResult>,
    pub timestamp: SystemTime,
}

/// Individual health check result
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: Option<String>,
}

/// API authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiAuthConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub basic_auth: Option<BasicAuthConfig>,
}

/// Basic authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

impl Default for ApiAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            basic_auth: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: RpcRequest =
            serde_json::from_value(json!({ "method": "bluetoothSocketConnGetPsm" })).unwrap();
        assert_eq!(request.id, Value::Null);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_error_response_has_null_result() {
        let response = RpcResponse::err(json!(7), "boom".to_string());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({ "id": 7, "result": null, "error": "boom" }));
    }
}
