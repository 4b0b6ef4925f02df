//! TCP listener with an explicit socket lifecycle.
//!
//! # Responsibilities
//! - Create, bind, and listen on the configured address
//! - Accept one client connection at a time
//! - Release the OS socket exactly once on close
//!
//! # States
//! ```text
//! Created → Bound → Listening → Closed
//! ```
//! Transitions are strictly forward; a closed listener is never reused.

use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpListener, TcpSocket};

use crate::config::ListenerConfig;
use crate::net::connection::{Connection, ConnectionTracker};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Failed to create the OS socket.
    #[error("Failed to create socket: {0}")]
    Create(std::io::Error),
    /// Failed to claim the address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    /// The OS rejected listen(2).
    #[error("Failed to listen: {0}")]
    Listen(std::io::Error),
    /// Failed to accept a connection.
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),
    /// Failed to release the socket.
    #[error("Failed to close socket: {0}")]
    Close(std::io::Error),
    /// Operation attempted in the wrong lifecycle state.
    #[error("Invalid socket state: expected {expected}, found {actual}")]
    InvalidState {
        expected: SocketState,
        actual: SocketState,
    },
}

/// Lifecycle state of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Created,
    Bound,
    Listening,
    Closed,
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SocketState::Created => "created",
            SocketState::Bound => "bound",
            SocketState::Listening => "listening",
            SocketState::Closed => "closed",
        };
        f.write_str(name)
    }
}

enum Inner {
    Socket(TcpSocket),
    Listening(TcpListener),
    Released,
}

/// A TCP listener that walks through the socket lifecycle explicitly.
pub struct Listener {
    inner: Inner,
    state: SocketState,
    max_read_bytes: usize,
    tracker: ConnectionTracker,
}

impl Listener {
    /// Create an unbound socket for the given address family.
    pub fn new(ip: IpAddr, max_read_bytes: usize) -> Result<Self, SocketError> {
        let socket = match ip {
            IpAddr::V4(_) => TcpSocket::new_v4(),
            IpAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(SocketError::Create)?;
        socket.set_reuseaddr(true).map_err(SocketError::Create)?;

        tracing::debug!(state = %SocketState::Created, "Socket created");

        Ok(Self {
            inner: Inner::Socket(socket),
            state: SocketState::Created,
            max_read_bytes,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Create, bind, and listen according to the listener configuration.
    pub fn open(config: &ListenerConfig) -> Result<Self, SocketError> {
        let ip: IpAddr = config.address.parse().map_err(|e| SocketError::Bind {
            addr: config.address.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;

        let mut listener = Self::new(ip, config.max_read_bytes)?;
        listener.bind(SocketAddr::new(ip, config.port))?;
        listener.listen(config.backlog)?;
        Ok(listener)
    }

    /// Claim the address. `Created → Bound`.
    pub fn bind(&mut self, addr: SocketAddr) -> Result<(), SocketError> {
        self.expect_state(SocketState::Created)?;
        let Inner::Socket(socket) = &self.inner else {
            return Err(self.invalid(SocketState::Created));
        };

        socket.bind(addr).map_err(|source| SocketError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        self.state = SocketState::Bound;
        tracing::debug!(address = %addr, state = %self.state, "Socket bound");
        Ok(())
    }

    /// Start listening. `Bound → Listening`.
    pub fn listen(&mut self, backlog: u32) -> Result<(), SocketError> {
        self.expect_state(SocketState::Bound)?;
        let Inner::Socket(socket) = std::mem::replace(&mut self.inner, Inner::Released) else {
            return Err(self.invalid(SocketState::Bound));
        };

        let listener = match socket.listen(backlog) {
            Ok(listener) => listener,
            Err(e) => {
                // The socket was consumed; nothing left to reuse.
                self.state = SocketState::Closed;
                return Err(SocketError::Listen(e));
            }
        };

        self.inner = Inner::Listening(listener);
        self.state = SocketState::Listening;

        tracing::info!(
            address = %self.local_addr()?,
            backlog,
            max_read_bytes = self.max_read_bytes,
            "Listener bound"
        );
        Ok(())
    }

    /// Wait for the next client. Only valid while listening.
    pub async fn accept(&self) -> Result<Connection, SocketError> {
        let Inner::Listening(listener) = &self.inner else {
            return Err(self.invalid(SocketState::Listening));
        };

        let (stream, peer_addr) = listener.accept().await.map_err(SocketError::Accept)?;
        let guard = self.tracker.track();

        tracing::debug!(
            peer_addr = %peer_addr,
            connection_id = %guard.id(),
            "Connection accepted"
        );

        Ok(Connection::new(stream, peer_addr, self.max_read_bytes, guard))
    }

    /// Release the OS socket. Any state → `Closed`.
    ///
    /// Closing twice reports an error rather than panicking.
    pub fn close(&mut self) -> Result<(), SocketError> {
        if self.state == SocketState::Closed {
            return Err(SocketError::Close(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket already closed",
            )));
        }

        self.inner = Inner::Released;
        self.state = SocketState::Closed;
        tracing::info!(state = %self.state, "Listener closed");
        Ok(())
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        match &self.inner {
            Inner::Socket(socket) if self.state == SocketState::Bound => {
                socket.local_addr().map_err(SocketError::Accept)
            }
            Inner::Listening(listener) => listener.local_addr().map_err(SocketError::Accept),
            _ => Err(self.invalid(SocketState::Listening)),
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Tracker counting connections accepted but not yet released.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    fn expect_state(&self, expected: SocketState) -> Result<(), SocketError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(expected))
        }
    }

    fn invalid(&self, expected: SocketState) -> SocketError {
        SocketError::InvalidState {
            expected,
            actual: self.state,
        }
    }
}
