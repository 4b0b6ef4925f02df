//! Writing the reply back to the client.
//!
//! # Responsibilities
//! - Shape worker output according to `worker.response_format`
//! - Send every byte within the send timeout
//! - Close the connection on every path

use std::time::Duration;

use bytes::Bytes;

use crate::config::ResponseFormat;
use crate::http::{CgiError, HttpResponse};
use crate::net::{Connection, SendError};
use crate::resilience::timeouts::with_timeout;

/// Turn raw worker output into the bytes sent to the client.
pub fn format_reply(format: ResponseFormat, output: Bytes) -> Result<Bytes, CgiError> {
    match format {
        ResponseFormat::Raw => Ok(output),
        ResponseFormat::Wrap => Ok(HttpResponse::wrap(output).to_bytes()),
        ResponseFormat::Cgi => Ok(HttpResponse::from_cgi(&output)?.to_bytes()),
    }
}

/// Write `reply` to the client, then shut the connection down.
///
/// The connection is consumed, so it is released whether or not the write
/// succeeded.
pub async fn relay(mut conn: Connection, reply: &[u8], timeout: Duration) -> Result<(), SendError> {
    let sent = with_timeout(timeout, conn.send_all(reply))
        .await
        .unwrap_or(Err(SendError::TimedOut(timeout)));

    if sent.is_ok() {
        tracing::debug!(bytes = reply.len(), "Response relayed");
    }
    conn.close().await;
    sent
}
