//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Client I/O and worker exchanges:
//!     → timeouts.rs (every wait has a deadline)
//! Worker supervision:
//!     → backoff.rs (delay between consecutive failed spawns)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Backoff is jittered so a crash-looping worker is not hammered

pub mod backoff;
pub mod timeouts;
