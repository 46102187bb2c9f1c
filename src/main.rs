//! Handler bridge server.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                   HANDLER BRIDGE                      │
//!     Client Request       │  ┌──────────┐   ┌───────────┐   ┌─────────────────┐  │
//!     ─────────────────────┼─▶│   axum   │──▶│  bridge   │──▶│ context (routes)│  │
//!                          │  │  layers  │   │middleware │   └────────┬────────┘  │
//!                          │  └──────────┘   └───────────┘            │           │
//!                          │                                          ▼           │
//!                          │              ┌────────────────┐   ┌──────────────┐   │
//!                          │              │  worker pool   │◀──│ interceptor  │   │
//!                          │              │ (blocking)     │   │    chain     │   │
//!                          │              └───────┬────────┘   └──────┬───────┘   │
//!                          │                      ▼                   ▼           │
//!     Client Response      │  ┌──────────┐   ┌──────────────────────────────┐     │
//!     ◀────────────────────┼──│completion│◀──│ response adapter / async ctx │     │
//!                          │  └──────────┘   └──────────────────────────────┘     │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use handler_bridge::config::{load_config, BridgeConfig};
use handler_bridge::http::HttpServer;
use handler_bridge::lifecycle::{bootstrap, signals::spawn_signal_listener, Shutdown};
use handler_bridge::observability::{logging::init_logging, metrics::init_metrics};
use handler_bridge::samples::default_registry;

#[derive(Parser, Debug)]
#[command(name = "handler-bridge", version, about = "Runs blocking handlers on an async HTTP host")]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => default_config(),
    };
    init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        context_path = %config.context.path,
        handlers = config.handlers.len(),
        "handler-bridge starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let context = bootstrap(&config, &default_registry())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let receiver = shutdown.subscribe();
    spawn_signal_listener(shutdown);

    HttpServer::new(&config, context).run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Sample application when no configuration file is given.
fn default_config() -> BridgeConfig {
    BridgeConfig {
        initializers: vec!["setup".to_string()],
        listeners: vec!["startup-log".to_string()],
        ..BridgeConfig::default()
    }
}
