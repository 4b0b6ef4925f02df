//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Metrics → Worker dispatcher → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close listener → Stop worker
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: metrics first, then the worker, then listeners
//! - Ordered shutdown: stop accept, finish the in-flight request, close
//! - Worker shutdown has a grace period: killed after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, StartupError};
