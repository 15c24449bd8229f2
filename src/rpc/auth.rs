//! RPC Authentication

use super::types::ApiAuthConfig;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-api-key";

/// Checks callers against the configured API key or basic credentials
pub struct ApiAuth {
    config: ApiAuthConfig,
}

impl ApiAuth {
    pub fn new(config: ApiAuthConfig) -> Self {
        Self { config }
    }

    fn validate_api_key(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.config.api_key else {
            return false;
        };
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|provided| provided == expected)
    }

    fn validate_basic_auth(&self, headers: &HeaderMap) -> bool {
        let Some(basic) = &self.config.basic_auth else {
            return false;
        };

        let credentials = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
            .and_then(|encoded| general_purpose::STANDARD.decode(encoded.trim()).ok())
            .and_then(|decoded| String::from_utf8(decoded).ok());

        match credentials.as_deref().and_then(|c| c.split_once(':')) {
            Some((username, password)) => username == basic.username && password == basic.password,
            None => false,
        }
    }

    /// Authenticate request headers
    pub fn authenticate(&self, headers: &HeaderMap) -> bool {
        if !self.config.enabled {
            return true;
        }

        if self.validate_api_key(headers) {
            debug!("API key authentication successful");
            return true;
        }

        if self.validate_basic_auth(headers) {
            debug!("Basic authentication successful");
            return true;
        }

        warn!("RPC authentication failed");
        false
    }
}

/// Authentication middleware function
pub async fn auth_middleware(
    State(auth): State<Arc<ApiAuth>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.authenticate(request.headers()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::BasicAuthConfig;
    use axum::http::HeaderValue;

    #[test]
    fn test_api_key_auth() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: true,
            api_key: Some("test-key".to_string()),
            basic_auth: None,
        });
        let mut headers = HeaderMap::new();

        assert!(!auth.authenticate(&headers));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("test-key"));
        assert!(auth.authenticate(&headers));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong-key"));
        assert!(!auth.authenticate(&headers));
    }

    #[test]
    fn test_basic_auth() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: true,
            api_key: None,
            basic_auth: Some(BasicAuthConfig {
                username: "harness".to_string(),
                password: "s3cret:with:colons".to_string(),
            }),
        });
        let mut headers = HeaderMap::new();
        assert!(!auth.authenticate(&headers));

        let encoded = general_purpose::STANDARD.encode("harness:s3cret:with:colons");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        assert!(auth.authenticate(&headers));

        let encoded = general_purpose::STANDARD.encode("harness:wrong");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        assert!(!auth.authenticate(&headers));
    }

    #[test]
    fn test_disabled_auth() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: false,
            api_key: Some("test-key".to_string()),
            basic_auth: None,
        });
        assert!(auth.authenticate(&HeaderMap::new()));
    }
}
