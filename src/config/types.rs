//! Configuration Types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::rpc::types::ApiAuthConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub socket: SocketConfig,
    pub transport: TransportConfig,
    pub events: EventsConfig,
    pub monitoring: MonitoringConfig,
}

/// RPC server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Socket facade defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SocketConfig {
    /// Buffer size used by reads that do not name one
    pub default_buffer_size: usize,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Accept timeout applied when a caller passes zero; zero here means wait forever
    #[serde(with = "humantime_serde")]
    pub default_accept_timeout: Duration,
    pub max_line_length: usize,
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Address listeners bind to
    pub listen_host: String,
    /// Bluetooth address -> host mapping for outbound connects
    #[serde(default)]
    pub peers: HashMap<String, String>,
    /// Static service UUID -> port records
    #[serde(default)]
    pub services: HashMap<String, u16>,
}

/// Event queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    pub capacity: usize,
    #[serde(with = "humantime_serde")]
    pub default_wait_timeout: Duration,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub api_auth: ApiAuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
                shutdown_timeout: Duration::from_secs(10),
            },
            socket: SocketConfig {
                default_buffer_size: 4096,
                connect_timeout: Duration::from_secs(30),
                default_accept_timeout: Duration::ZERO,
                max_line_length: 64 * 1024,
            },
            transport: TransportConfig {
                listen_host: "127.0.0.1".to_string(),
                peers: HashMap::new(),
                services: HashMap::new(),
            },
            events: EventsConfig {
                capacity: 1024,
                default_wait_timeout: Duration::from_secs(10),
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
                metrics_enabled: true,
                api_auth: ApiAuthConfig::default(),
            },
        }
    }
}
