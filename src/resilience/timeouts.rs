//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap client reads/writes and worker exchanges with a deadline
//! - Treat a zero duration as "no deadline"
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Dropping the timed-out future cancels the operation

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Run `fut` with a deadline. `Duration::ZERO` disables the deadline.
pub async fn with_timeout<F>(limit: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    if limit.is_zero() {
        return Ok(fut.await);
    }
    tokio::time::timeout(limit, fut).await
}
