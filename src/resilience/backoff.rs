//! Exponential backoff with jitter, used between worker respawns.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based).
///
/// Doubles from `base`, capped at `max`, plus up to 10% jitter.
/// Attempt 0 means no delay.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    let capped = base.saturating_mul(factor).min(max);
    let jitter = capped.mul_f64(rand::thread_rng().gen_range(0.0..0.1));

    capped.saturating_add(jitter)
}
