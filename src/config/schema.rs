//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, backlog, read limit).
    pub listener: ListenerConfig,

    /// Static server identity reported to the worker.
    pub server: ServerConfig,

    /// Worker process settings.
    pub worker: WorkerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind (e.g., "127.0.0.1").
    pub address: String,

    /// Port to bind. Zero picks an ephemeral port.
    pub port: u16,

    /// Pending connection queue length passed to listen(2).
    pub backlog: u32,

    /// Upper bound on bytes read from a client for one request.
    pub max_read_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8100,
            backlog: 128,
            max_read_bytes: 1024,
        }
    }
}

/// Identity the gateway reports in `SERVER_NAME`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "SWGI-Server".to_string(),
        }
    }
}

/// How worker processes are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// One long-lived process serves every request.
    Persistent,
    /// A fresh process per request.
    PerRequest,
}

impl std::fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerMode::Persistent => write!(f, "persistent"),
            WorkerMode::PerRequest => write!(f, "per_request"),
        }
    }
}

/// How the relay treats worker output before writing it to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Relay worker bytes verbatim.
    Raw,
    /// Wrap worker bytes as the body of a 200 response.
    Wrap,
    /// Worker writes `Status:` and header lines, a blank line, then the body.
    Cgi,
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable to run.
    pub program: String,

    /// Arguments passed to the executable (typically the runtime script).
    pub args: Vec<String>,

    /// Working directory for the worker. Inherits the gateway's when unset.
    pub working_dir: Option<PathBuf>,

    /// Scheduling strategy.
    pub mode: WorkerMode,

    /// Byte sequence that ends one response from a persistent worker.
    pub response_delimiter: String,

    /// Maximum response size accepted from the worker.
    pub max_response_bytes: usize,

    /// Treatment of worker output on the way back to the client.
    pub response_format: ResponseFormat,

    /// Base delay for respawn backoff in milliseconds.
    pub respawn_base_delay_ms: u64,

    /// Maximum delay for respawn backoff in milliseconds.
    pub respawn_max_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["runtime.py".to_string()],
            working_dir: None,
            mode: WorkerMode::Persistent,
            response_delimiter: "\n".to_string(),
            max_response_bytes: 1024 * 1024,
            response_format: ResponseFormat::Raw,
            respawn_base_delay_ms: 100,
            respawn_max_delay_ms: 5000,
        }
    }
}

/// Timeout configuration for every blocking point.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for the client to deliver its request, in milliseconds.
    pub receive_ms: u64,

    /// Time allowed for one worker exchange, in milliseconds.
    pub worker_ms: u64,

    /// Time allowed to write the response to the client, in milliseconds.
    pub send_ms: u64,

    /// Time a worker gets to exit after its input is closed, in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl TimeoutConfig {
    pub fn receive(&self) -> Duration {
        Duration::from_millis(self.receive_ms)
    }

    pub fn worker(&self) -> Duration {
        Duration::from_millis(self.worker_ms)
    }

    pub fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            receive_ms: 10_000,
            worker_ms: 30_000,
            send_ms: 10_000,
            shutdown_grace_ms: 3_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}
