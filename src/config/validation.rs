//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Every violation is reported, not just the first.

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::{GatewayConfig, ResponseFormat, WorkerMode};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.address",
            format!("'{}' is not an IP address", config.listener.address),
        ));
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::new("listener.backlog", "must be greater than 0"));
    }
    if config.listener.max_read_bytes == 0 {
        errors.push(ValidationError::new(
            "listener.max_read_bytes",
            "must be greater than 0",
        ));
    }

    if config.worker.program.trim().is_empty() {
        errors.push(ValidationError::new("worker.program", "must not be empty"));
    }
    if config.worker.mode == WorkerMode::Persistent && config.worker.response_delimiter.is_empty() {
        errors.push(ValidationError::new(
            "worker.response_delimiter",
            "must not be empty for a persistent worker",
        ));
    }
    if config.worker.mode == WorkerMode::Persistent
        && config.worker.response_format == ResponseFormat::Cgi
        && is_line_break_only(&config.worker.response_delimiter)
    {
        // A CGI reply is several lines; such a delimiter would cut it at the first one.
        errors.push(ValidationError::new(
            "worker.response_delimiter",
            "a persistent CGI worker needs a delimiter that cannot occur in a header block",
        ));
    }
    if config.worker.max_response_bytes == 0 {
        errors.push(ValidationError::new(
            "worker.max_response_bytes",
            "must be greater than 0",
        ));
    }
    if config.worker.respawn_base_delay_ms > config.worker.respawn_max_delay_ms {
        errors.push(ValidationError::new(
            "worker.respawn_base_delay_ms",
            "must not exceed worker.respawn_max_delay_ms",
        ));
    }

    let timeouts = [
        ("timeouts.receive_ms", config.timeouts.receive_ms),
        ("timeouts.worker_ms", config.timeouts.worker_ms),
        ("timeouts.send_ms", config.timeouts.send_ms),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_line_break_only(delimiter: &str) -> bool {
    !delimiter.is_empty() && delimiter.bytes().all(|b| b == b'\r' || b == b'\n')
}
