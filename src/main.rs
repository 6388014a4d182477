//! Tunnel relay service.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                  TUNNEL RELAY                    │
//!                      │                                                  │
//!   Tunnel session     │  ┌──────────┐   ┌──────────┐                     │
//!   ───────────────────┼─▶│  tunnel  │──▶│  frame   │──┐                  │
//!   (len-prefixed JSON)│  │ listener │   │  codec   │  │  ┌────────────┐  │
//!                      │  └──────────┘   └──────────┘  ├─▶│ resilience │  │
//!   HTTP request       │  ┌──────────┐   ┌──────────┐  │  │  deadline  │  │
//!   ───────────────────┼─▶│   http   │──▶│ request  │──┘  └─────┬──────┘  │
//!                      │  │  server  │   │ convert  │           ▼         │
//!                      │  └──────────┘   └──────────┘    ┌────────────┐   │
//!                      │                                 │ dispatcher │   │
//!   Response           │                                 │ (immutable)│   │
//!   ◀──────────────────┼──── same session / connection ◀─┴────────────┘   │
//!                      │                                                  │
//!                      │  config · observability · lifecycle              │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tunnel_relay::config::{self, RelayConfig};
use tunnel_relay::lifecycle::{self, signals, Shutdown};
use tunnel_relay::observability::{self, metrics};
use tunnel_relay::service;

#[derive(Parser)]
#[command(name = "tunnel-relay")]
#[command(about = "Serve the example service over tunnel sessions and HTTP", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP bind address.
    #[arg(long)]
    http_bind: Option<String>,

    /// Override the tunnel bind address.
    #[arg(long)]
    tunnel_bind: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(addr) = args.http_bind {
        config.http.bind_address = addr;
    }
    if let Some(addr) = args.tunnel_bind {
        config.tunnel.bind_address = addr;
    }
    if args.log_json {
        config.observability.log_json = true;
    }
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;

    observability::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tunnel-relay starting");

    tracing::info!(
        http_enabled = config.http.enabled,
        http_bind = %config.http.bind_address,
        tunnel_enabled = config.tunnel.enabled,
        tunnel_bind = %config.tunnel.bind_address,
        max_connections = config.tunnel.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let dispatcher = Arc::new(service::dispatcher().map_err(lifecycle::StartupError::from)?);
    let listeners = lifecycle::bind(&config).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    lifecycle::serve(&config, listeners, dispatcher, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
