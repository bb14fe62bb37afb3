//! POST Load Balancer
//!
//! A reverse proxy for POST traffic built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    POST BALANCER                      │
//!                 │                                                       │
//!   Client POST   │  ┌─────────┐   ┌───────────┐   ┌────────────────┐    │
//!   ──────────────┼─▶│  http   │──▶│ allowlist │──▶│ registry claim │    │
//!                 │  │ server  │   └───────────┘   └───────┬────────┘    │
//!                 │  └─────────┘                  none free │   claimed   │
//!                 │                                        ▼      │      │
//!                 │                              ┌──────────────┐ │      │
//!                 │                              │  admission   │ │      │
//!                 │                              │ queue + retry│ │      │
//!                 │                              └──────┬───────┘ │      │
//!                 │                                     ▼         ▼      │
//!   Response      │                              ┌────────────────────┐  │
//!   ◀─────────────┼──────────────────────────────│     forwarder      │──┼──▶ Backend
//!                 │                              └────────────────────┘  │
//!                 │                                                       │
//!                 │   prober ── TCP dial ──▶ alive flags                  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use post_balancer::config::load_config;
use post_balancer::lifecycle::{wait_for_signal, Shutdown};
use post_balancer::observability::{logging, metrics};
use post_balancer::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "post-balancer", version, about = "Load balancer for POST traffic")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    if cli.check {
        println!("{}: configuration OK", cli.config.display());
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "post-balancer starting");

    tracing::info!(
        config = %cli.config.display(),
        backends = config.outgoing.servers.len(),
        allowed_ips = config.incoming.allowed_ips.len(),
        queue_capacity = config.queue.capacity,
        forward_timeout_secs = config.outgoing.forward_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = wait_for_signal().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signals");
            }
            shutdown.trigger();
        }
    });

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
