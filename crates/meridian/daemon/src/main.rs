//! Meridian daemon - service registry and configuration server
//!
//! The daemon provides:
//! - Instance registration with leases and heartbeats
//! - Expiry-based eviction guarded by self-preservation
//! - Peer-to-peer replication of registry changes
//! - Layered configuration served from a versioned store

use clap::Parser;
use meridian_daemon::config::BackendConfig;
use meridian_daemon::{DaemonConfig, DaemonError, DaemonResult, Server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Meridian Daemon CLI
#[derive(Parser)]
#[command(name = "meridiand")]
#[command(about = "Meridian - Service registry and configuration server", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MERIDIAN_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long, env = "MERIDIAN_LISTEN_ADDR")]
    listen: Option<String>,

    /// Peer registry base URL; repeat for several peers
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Serve configuration from this directory (one sub-directory per label)
    #[arg(long)]
    config_root: Option<PathBuf>,

    /// Single node, in-memory config store, no credentials
    #[arg(long)]
    dev: bool,

    /// Log level
    #[arg(long, env = "MERIDIAN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MERIDIAN_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if cli.dev {
        DaemonConfig::development()
    } else {
        DaemonConfig::load(cli.config.as_deref())
            .map_err(|e| DaemonError::Config(e.to_string()))?
    };

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if !cli.peers.is_empty() {
        config.replication.peers = cli.peers.clone();
    }
    if let Some(root) = cli.config_root.clone() {
        config.config_store.backend = BackendConfig::Filesystem { root };
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        peers = config.replication.peers.len(),
        "Starting Meridian daemon"
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
