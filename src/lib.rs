//! Worker Gateway Library
//!
//! Accepts raw HTTP/1.x requests over TCP, turns each into a CGI/WSGI-style
//! environment record, hands it to an external worker process, and relays the
//! worker's output back to the client.

pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod worker;

pub use config::schema::GatewayConfig;
pub use gateway::{Gateway, GatewayError};
pub use lifecycle::Shutdown;
pub use worker::Dispatcher;
