//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Spawn the worker before any client can connect
//! - Bind the listener last (traffic only when ready)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Logging is the caller's job so it can be set up before config errors

use std::net::SocketAddr;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::net::{Listener, SocketError};
use crate::observability::metrics;
use crate::worker::{build_dispatcher, WorkerError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid metrics address '{address}'")]
    MetricsAddress { address: String },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to start worker: {0}")]
    Worker(#[from] WorkerError),

    #[error("failed to open listener: {0}")]
    Listener(#[from] SocketError),
}

/// Bring the gateway up: metrics, then the worker, then the listener.
pub async fn start(config: &GatewayConfig) -> Result<Gateway, StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse().map_err(|_| {
            StartupError::MetricsAddress {
                address: config.observability.metrics_address.clone(),
            }
        })?;
        metrics::init_metrics(addr)?;
    }

    let dispatcher = build_dispatcher(config).await?;
    tracing::info!(
        mode = %dispatcher.mode(),
        program = %config.worker.program,
        args = ?config.worker.args,
        "Worker dispatcher ready"
    );

    let listener = match Listener::open(&config.listener) {
        Ok(listener) => listener,
        Err(e) => {
            dispatcher.shutdown().await;
            return Err(e.into());
        }
    };

    Ok(Gateway::new(listener, dispatcher, config)?)
}
