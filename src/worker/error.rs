//! Worker failure taxonomy.

use std::process::ExitStatus;
use std::time::Duration;

use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The process could not be started (missing executable, permission denied).
    #[error("failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The request or response channel closed mid-exchange.
    #[error("worker channel broken: {0}")]
    BrokenChannel(String),

    /// No complete response within the configured wait.
    #[error("worker did not respond within {0:?}")]
    Timeout(Duration),

    /// The process exited unsuccessfully. `output` holds whatever it wrote first.
    #[error("worker exited with {status}")]
    Failure { status: ExitStatus, output: Bytes },

    /// The response exceeded the configured limit.
    #[error("worker response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// The Environment could not be rendered to JSON.
    #[error("failed to serialize request environment: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WorkerError {
    pub(crate) fn broken(context: &str, err: impl std::fmt::Display) -> Self {
        WorkerError::BrokenChannel(format!("{context}: {err}"))
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Spawn { .. } => "spawn",
            WorkerError::BrokenChannel(_) => "broken_channel",
            WorkerError::Timeout(_) => "timeout",
            WorkerError::Failure { .. } => "failure",
            WorkerError::ResponseTooLarge { .. } => "too_large",
            WorkerError::Serialize(_) => "serialize",
        }
    }
}
