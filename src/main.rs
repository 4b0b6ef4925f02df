//! Worker Gateway
//!
//! An HTTP front door for programs that speak a line-oriented environment
//! protocol on stdin/stdout.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────┐
//!                         │                 WORKER GATEWAY                │
//!     Client Request      │  ┌─────────┐    ┌─────────┐    ┌───────────┐  │
//!     ────────────────────┼─▶│   net   │───▶│  http   │───▶│  worker   │──┼──▶ stdin
//!                         │  │listener │    │ parser  │    │dispatcher │  │
//!                         │  └─────────┘    └─────────┘    └─────┬─────┘  │
//!     Client Response     │  ┌─────────┐                         │        │
//!     ◀───────────────────┼──│ gateway │◀────────────────────────┘◀───────┼─── stdout
//!                         │  │  relay  │                                  │
//!                         │  └─────────┘                                  │
//!                         │  config · lifecycle · observability · resilience
//!                         └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use worker_gateway::config::{load_config, validate_config, ConfigError, GatewayConfig};
use worker_gateway::lifecycle::{self, signals, Shutdown};
use worker_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "worker-gateway")]
#[command(about = "Bridge HTTP clients to a worker process over stdin/stdout", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file).
    #[arg(short, long)]
    address: Option<String>,

    /// Listen port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (overrides the config file; RUST_LOG still wins).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(address) = &self.address {
            config.listener.address = address.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability);
    tracing::info!("worker-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    // CLI overrides bypass the loader's checks.
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(field = error.field, "{}", error.message);
        }
        return Err(ConfigError::Validation(errors).into());
    }

    tracing::info!(
        address = %config.listener.address,
        port = config.listener.port,
        worker = %config.worker.program,
        mode = %config.worker.mode,
        "Configuration loaded"
    );

    let gateway = lifecycle::start(&config).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    gateway.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
