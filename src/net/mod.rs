//! Network layer: the listening socket and accepted connections.
//!
//! # Data Flow
//! ```text
//! Listener::open (create → bind → listen)
//!     → Listener::accept → Connection
//!     → Connection::receive (bounded request bytes)
//!     → Connection::send_all → Connection::close
//! ```
//!
//! # Design Decisions
//! - Each handle is owned by exactly one value; `Drop` releases it
//! - A `ConnectionTracker` counts live connections so leaks are visible
//! - No TLS; plaintext HTTP only

pub mod connection;
pub mod listener;

pub use connection::{
    Connection, ConnectionGuard, ConnectionId, ConnectionTracker, ReceiveError, SendError,
};
pub use listener::{Listener, SocketError, SocketState};
