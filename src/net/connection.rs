//! Accepted client connections and lifetime tracking.
//!
//! # Responsibilities
//! - Own the client stream exclusively; release it exactly once
//! - Read one bounded request payload
//! - Write a complete response, looping over short writes
//! - Count live connections so leaks are observable

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Failure while reading a request from the client.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    /// The peer closed before sending anything.
    #[error("peer closed the connection before sending a request")]
    Eof,
    #[error("read failed: {0}")]
    ReadFailed(#[from] std::io::Error),
    #[error("client did not send a request within {0:?}")]
    TimedOut(std::time::Duration),
}

/// Failure while writing a response to the client.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("write failed after {written} of {total} bytes: {source}")]
    Write {
        written: usize,
        total: usize,
        source: std::io::Error,
    },
    #[error("client did not accept the response within {0:?}")]
    TimedOut(std::time::Duration),
}

/// Counts connections that have been accepted but not yet released.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_connections(active);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(active);
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}

/// One accepted client.
///
/// Dropping the connection closes the stream and releases its tracker slot,
/// so every exit path frees the descriptor exactly once.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    max_read_bytes: usize,
    guard: ConnectionGuard,
}

impl Connection {
    pub(crate) fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        max_read_bytes: usize,
        guard: ConnectionGuard,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            max_read_bytes,
            guard,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one request into a buffer of at most `max_read_bytes`.
    ///
    /// Stops at the end of the header block, a full buffer, or EOF. Anything
    /// past the buffer limit is left unread.
    pub async fn receive(&mut self) -> Result<Bytes, ReceiveError> {
        let mut buf = vec![0u8; self.max_read_bytes];
        let mut filled = 0;

        while filled < buf.len() {
            let n = self.stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            let scan_from = filled.saturating_sub(HEADER_TERMINATOR.len() - 1);
            filled += n;
            if contains(&buf[scan_from..filled], HEADER_TERMINATOR) {
                break;
            }
        }

        if filled == 0 {
            return Err(ReceiveError::Eof);
        }
        if filled == buf.len() {
            tracing::debug!(
                max_read_bytes = self.max_read_bytes,
                "Request filled the read buffer; remainder is ignored"
            );
        }

        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    /// Write every byte, looping over short writes.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<(), SendError> {
        let mut written = 0;
        while written < data.len() {
            match self.stream.write(&data[written..]).await {
                Ok(0) => {
                    return Err(SendError::Write {
                        written,
                        total: data.len(),
                        source: std::io::ErrorKind::WriteZero.into(),
                    })
                }
                Ok(n) => written += n,
                Err(source) => {
                    return Err(SendError::Write {
                        written,
                        total: data.len(),
                        source,
                    })
                }
            }
        }
        self.stream.flush().await.map_err(|source| SendError::Write {
            written,
            total: data.len(),
            source,
        })
    }

    /// Shut down the write side, then release the stream.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!(connection_id = %self.id(), error = %e, "Shutdown after response failed");
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
