//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        Self::apply_env(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BTSOCK_*` overrides read through `lookup`
    pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup("BTSOCK_BIND_ADDR") {
            config.server.bind_addr = bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid BTSOCK_BIND_ADDR: {}", bind_addr))?;
        }

        if let Some(buffer_size) = lookup("BTSOCK_BUFFER_SIZE") {
            config.socket.default_buffer_size = buffer_size
                .parse::<usize>()
                .with_context(|| format!("Invalid BTSOCK_BUFFER_SIZE: {}", buffer_size))?;
        }

        if let Some(timeout) = lookup("BTSOCK_CONNECT_TIMEOUT") {
            config.socket.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid BTSOCK_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Some(timeout) = lookup("BTSOCK_ACCEPT_TIMEOUT") {
            config.socket.default_accept_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid BTSOCK_ACCEPT_TIMEOUT: {}", timeout))?;
        }

        if let Some(host) = lookup("BTSOCK_LISTEN_HOST") {
            config.transport.listen_host = host;
        }

        if let Some(auth_enabled) = lookup("BTSOCK_AUTH_ENABLED") {
            config.monitoring.api_auth.enabled = auth_enabled
                .parse::<bool>()
                .with_context(|| format!("Invalid BTSOCK_AUTH_ENABLED: {}", auth_enabled))?;
        }

        if let Some(api_key) = lookup("BTSOCK_API_KEY") {
            config.monitoring.api_auth.api_key = Some(api_key);
        }

        if let Some(log_level) = lookup("BTSOCK_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        Ok(())
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_socket_config()
            .with_context(|| "Socket configuration validation failed")?;

        self.validate_transport_config()
            .with_context(|| "Transport configuration validation failed")?;

        self.validate_events_config()
            .with_context(|| "Events configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        if self.server.shutdown_timeout > Duration::from_secs(300) {
            bail!("shutdown_timeout cannot exceed 5 minutes");
        }

        Ok(())
    }

    fn validate_socket_config(&self) -> Result<()> {
        if self.socket.default_buffer_size == 0 {
            bail!("default_buffer_size must be greater than 0");
        }

        if self.socket.default_buffer_size > 1048576 {
            bail!("default_buffer_size cannot exceed 1MB");
        }

        if self.socket.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.socket.max_line_length < 16 {
            bail!("max_line_length must be at least 16 bytes");
        }

        Ok(())
    }

    fn validate_transport_config(&self) -> Result<()> {
        if self.transport.listen_host.is_empty() {
            bail!("transport.listen_host must not be empty");
        }

        for (uuid, port) in &self.transport.services {
            if uuid::Uuid::parse_str(uuid).is_err() {
                bail!("Service record '{}' is not a valid UUID", uuid);
            }
            if *port == 0 {
                bail!("Service record '{}' maps to invalid port 0", uuid);
            }
        }

        for (address, host) in &self.transport.peers {
            if host.is_empty() {
                bail!("Peer '{}' has an empty host", address);
            }
        }

        Ok(())
    }

    fn validate_events_config(&self) -> Result<()> {
        if self.events.capacity == 0 {
            bail!("events.capacity must be greater than 0");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        let auth = &self.monitoring.api_auth;
        if auth.enabled && auth.api_key.is_none() && auth.basic_auth.is_none() {
            bail!("API authentication is enabled but neither api_key nor basic_auth is set");
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        buffer_size: Option<usize>,
        accept_timeout: Option<u64>,
        no_auth: bool,
    ) {
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(buffer_size) = buffer_size {
            self.socket.default_buffer_size = buffer_size;
            tracing::info!("CLI override: buffer size set to {} bytes", buffer_size);
        }

        if let Some(timeout_ms) = accept_timeout {
            self.socket.default_accept_timeout = Duration::from_millis(timeout_ms);
            tracing::info!("CLI override: default accept timeout set to {}ms", timeout_ms);
        }

        if no_auth {
            self.monitoring.api_auth.enabled = false;
            tracing::info!("CLI override: API authentication disabled");
        }
    }
}
