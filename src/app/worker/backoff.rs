//! Retry delays for connection failures

use std::time::Duration;

use crate::constants::transport::{BACKOFF_JITTER_PERCENTAGE, MAX_BACKOFF_MULTIPLIER};

/// Exponential backoff with jitter
pub struct BackoffCalculator;

impl BackoffCalculator {
    /// Delay before retry number `retry` (starting at 1)
    ///
    /// Doubles `base_delay` per retry up to [`MAX_BACKOFF_MULTIPLIER`]
    /// doublings, caps the result at `max_delay` and spreads it by
    /// [`BACKOFF_JITTER_PERCENTAGE`].
    pub fn retry_delay(retry: u32, base_delay: Duration, max_delay: Duration) -> Duration {
        let exponent = retry.saturating_sub(1).min(MAX_BACKOFF_MULTIPLIER);
        let base_millis = base_delay.as_millis() as u64;
        let capped = base_millis
            .saturating_mul(1u64 << exponent)
            .min(max_delay.as_millis() as u64);

        let jitter_range = (capped as f64 * BACKOFF_JITTER_PERCENTAGE) as u64;
        let jittered = if jitter_range > 0 {
            capped.saturating_add(fastrand::u64(0..=jitter_range * 2)).saturating_sub(jitter_range)
        } else {
            capped
        };
        Duration::from_millis(jittered.min(max_delay.as_millis() as u64))
    }
}
