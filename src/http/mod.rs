//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! raw request bytes
//!     → request.rs (request line + headers → Environment)
//!     → environment.rs (Environment → JSON record for the worker)
//!     → [worker produces reply bytes]
//!     → response.rs (gateway-generated or wrapped responses)
//!     → Send to client
//! ```
//!
//! # Limitations
//! - Request bodies are not forwarded
//! - Only Content-Type and Content-Length reach the worker

pub mod environment;
pub mod request;
pub mod response;

pub use environment::{Environment, RequestParts, ServerIdentity};
pub use request::{MalformedRequest, RequestParser};
pub use response::{CgiError, HttpResponse};
