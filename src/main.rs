//! RED metrics demo service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ axum router ──┬─▶ /health   {"ok":true}
//!                              ├─▶ /work     sleep 20-250ms, 8% simulated 500
//!                              │       │
//!                              │       ▼
//!                              │   RedMetrics (requests_total, duration histogram)
//!                              │       ▲
//!                              └─▶ /metrics  Prometheus text exposition
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use red_demo::config::{load_config, validate_config, ConfigError, ServiceConfig};
use red_demo::lifecycle::{wait_for_shutdown_signal, Shutdown};
use red_demo::observability::logging::init_logging;
use red_demo::HttpServer;

#[derive(Parser)]
#[command(name = "red-demo")]
#[command(about = "Demo HTTP service emitting RED metrics", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ServiceConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "red-demo starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        log_level = %config.observability.log_level,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    let server = HttpServer::new(config);
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
