//! btsock - Bluetooth socket connection daemon
//!
//! Keeps a registry of RFCOMM/L2CAP connections and exposes connect, accept
//! and per-connection I/O as remote calls for test automation.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use btsock::{config::ConfigManager, rpc::RpcServer, ShutdownCoordinator, SocketFacade};

/// CLI arguments for btsock
#[derive(Parser, Debug)]
#[command(name = "btsock")]
#[command(about = "btsock - Bluetooth socket connection daemon")]
#[command(version)]
#[command(long_about = "
btsock - Bluetooth socket connection daemon

Opens outbound and inbound RFCOMM/L2CAP connections on request and keeps them
in a registry keyed by connection id. Test harnesses drive it through JSON
remote calls on /api/v1/rpc.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  BTSOCK_BIND_ADDR        - RPC bind address (e.g., 127.0.0.1:8081)
  BTSOCK_BUFFER_SIZE      - Default read buffer size in bytes
  BTSOCK_CONNECT_TIMEOUT  - Outbound connect timeout (e.g., 30s)
  BTSOCK_ACCEPT_TIMEOUT   - Default accept timeout (e.g., 2m, 0s waits forever)
  BTSOCK_LISTEN_HOST      - Address listeners bind to
  BTSOCK_AUTH_ENABLED     - Enable RPC authentication (true/false)
  BTSOCK_API_KEY          - RPC API key
  BTSOCK_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "btsock.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "RPC bind address (e.g., 127.0.0.1:8081)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "RPC port to bind to")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file's
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Default read buffer size in bytes
    #[arg(long, help = "Default read buffer size in bytes")]
    pub buffer_size: Option<usize>,

    /// Default accept timeout in milliseconds
    #[arg(long, help = "Default accept timeout in milliseconds (0 waits forever)")]
    pub accept_timeout: Option<u64>,

    /// Disable RPC authentication (overrides config file)
    #[arg(long, help = "Disable RPC authentication")]
    pub no_auth: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.buffer_size,
        args.accept_timeout,
        args.no_auth,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config.monitoring.log_level)?;

    info!("Starting btsock v{}", env!("CARGO_PKG_VERSION"));

    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  RPC bind address: {}", config.server.bind_addr);
        info!("  Default buffer size: {} bytes", config.socket.default_buffer_size);
        info!("  Connect timeout: {:?}", config.socket.connect_timeout);
        info!("  Default accept timeout: {:?}", config.socket.default_accept_timeout);
        info!("  Listen host: {}", config.transport.listen_host);
        info!("  Known peers: {}", config.transport.peers.len());
        info!("  Static services: {}", config.transport.services.len());
        info!(
            "  Authentication: {}",
            if config.monitoring.api_auth.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    }

    info!("Configuration loaded successfully");
    info!("RPC bind address: {}", config.server.bind_addr);

    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    let facade = Arc::new(SocketFacade::from_config(&config));

    let server = RpcServer::new(&config, Arc::clone(&facade));
    let stop_signal = shutdown_coordinator.signalled();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.start(stop_signal).await {
            error!("RPC server error: {}", e);
        }
    });

    info!("btsock started; press Ctrl+C or send SIGTERM/SIGINT to shut down");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    info!("Initiating graceful shutdown...");

    if let Err(e) = server_handle.await {
        if !e.is_cancelled() {
            error!("RPC server task failed: {}", e);
        }
    }

    shutdown_coordinator.shutdown_facade(&facade).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, configured_level: &str) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(configured_level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
