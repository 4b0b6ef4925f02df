//! Worker process subsystem.
//!
//! # Data Flow
//! ```text
//! Environment
//!     → Dispatcher::dispatch
//!         persistent:  codec.rs frames the record onto a long-lived process
//!         per_request: command.rs spawns a fresh process, output read to EOF
//!     → reply bytes (or WorkerError)
//! ```
//!
//! # Design Decisions
//! - Exactly one strategy is active, chosen by `worker.mode`
//! - The gateway never interprets reply bytes here; formatting happens on relay
//! - Every exchange is bounded by a timeout and a response size limit

pub mod codec;
pub mod command;
pub mod error;
pub mod per_request;
pub mod persistent;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{GatewayConfig, WorkerMode};
use crate::http::Environment;

pub use command::WorkerCommand;
pub use error::WorkerError;
pub use per_request::PerRequestWorker;
pub use persistent::{PersistentWorker, SessionLimits, WorkerSession};

/// Hands one request to the worker and returns its reply.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, env: Environment) -> Result<Bytes, WorkerError>;

    /// Release the worker. Dispatches after this may respawn.
    async fn shutdown(&self);

    fn mode(&self) -> WorkerMode;
}

/// Build the dispatcher selected by configuration.
///
/// A persistent worker is spawned here so startup fails fast when the
/// program cannot be launched.
pub async fn build_dispatcher(config: &GatewayConfig) -> Result<Arc<dyn Dispatcher>, WorkerError> {
    match config.worker.mode {
        WorkerMode::Persistent => {
            let worker = PersistentWorker::new(
                WorkerCommand::from_config(&config.worker),
                SessionLimits::from_config(config),
            );
            worker.start().await?;
            Ok(Arc::new(worker))
        }
        WorkerMode::PerRequest => Ok(Arc::new(PerRequestWorker::from_config(config))),
    }
}
