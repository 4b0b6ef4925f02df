//! Request loop tying the listener, parser, worker, and relay together.
//!
//! # Data Flow
//! ```text
//! Listener::accept → Connection
//!     → Connection::receive (bounded, timed)
//!     → RequestParser::parse → Environment
//!     → Dispatcher::dispatch → worker output
//!     → relay::format_reply → relay::relay → close
//! ```

pub mod error;
pub mod relay;
pub mod server;

pub use error::GatewayError;
pub use relay::{format_reply, relay};
pub use server::{Gateway, GatewayStage};
