//! Relay reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     RELAY PROXY                      │
//!                      │                                                      │
//!   Client Request     │  ┌─────────┐   ┌──────────┐   ┌───────────────┐      │
//!   ───────────────────┼─▶│  http   │──▶│ snapshot │──▶│    routing    │      │
//!                      │  │ server  │   │ current()│   │ RouteTable    │      │
//!                      │  └─────────┘   └──────────┘   └───────┬───────┘      │
//!                      │                                      ▼              │
//!                      │                              ┌───────────────┐      │
//!                      │                              │ load_balancer │      │
//!                      │                              │ Cluster::pick │      │
//!                      │                              └───────┬───────┘      │
//!                      │                                      ▼              │
//!   Client Response    │  ┌─────────┐                 ┌───────────────┐      │
//!   ◀──────────────────┼──│guarded  │◀────────────────│   forwarder   │◀─────┼── Destination
//!                      │  │ body    │                 │ retry/timeout │      │
//!                      │  └─────────┘                 └───────────────┘      │
//!                      │                                                      │
//!                      │  config (+ watcher) · health (active/passive)        │
//!                      │  observability · admin · lifecycle                   │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use relay_proxy::config::{load_config, ConfigWatcher, ProxyConfig};
use relay_proxy::observability::{logging, metrics};
use relay_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "relay-proxy", version, about = "HTTP reverse proxy with hot-reloadable routing")]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "relay-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        clusters = config.clusters.len(),
        attempt_timeout_ms = config.timeouts.attempt_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher handle alive for the lifetime of the server.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
