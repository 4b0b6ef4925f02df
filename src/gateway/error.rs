//! Per-request failures and how the client sees them.

use crate::http::{CgiError, HttpResponse, MalformedRequest};
use crate::net::{ReceiveError, SendError, SocketError};
use crate::worker::WorkerError;

/// Everything that can end a request early, aggregated at the loop boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Receive(#[from] ReceiveError),

    #[error("malformed request: {0}")]
    Malformed(#[from] MalformedRequest),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("worker produced no output")]
    EmptyReply,

    #[error("unusable worker output: {0}")]
    InvalidReply(#[from] CgiError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl GatewayError {
    /// Response to send before closing, or `None` to close silently.
    pub fn response(&self) -> Option<HttpResponse> {
        let (status, message) = match self {
            GatewayError::Socket(_) | GatewayError::Send(_) => return None,
            GatewayError::Receive(ReceiveError::TimedOut(_)) => (408, "Request Timeout"),
            GatewayError::Receive(_) => return None,
            GatewayError::Malformed(_) => (400, "Bad Request"),
            GatewayError::Worker(WorkerError::Timeout(_)) => (504, "Gateway Timeout"),
            GatewayError::Worker(_) | GatewayError::EmptyReply | GatewayError::InvalidReply(_) => {
                (502, "Bad Gateway")
            }
        };
        Some(HttpResponse::error(status, message))
    }

    /// Label for the `outcome` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::Socket(_) => "socket_error",
            GatewayError::Receive(ReceiveError::TimedOut(_)) => "receive_timeout",
            GatewayError::Receive(_) => "receive_error",
            GatewayError::Malformed(_) => "malformed",
            GatewayError::Worker(WorkerError::Timeout(_)) => "worker_timeout",
            GatewayError::Worker(_) => "worker_error",
            GatewayError::EmptyReply => "empty_reply",
            GatewayError::InvalidReply(_) => "invalid_reply",
            GatewayError::Send(_) => "send_error",
        }
    }
}
