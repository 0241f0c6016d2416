//! Retry delays for failed rebuilds.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based); `0` means retry immediately.
///
/// Doubles from `base` up to `max`, plus up to 10% jitter so that sites
/// failing together spread their retries out.
pub fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    let capped = base.saturating_mul(factor).min(max);

    let jitter_range = capped / 10;
    if jitter_range.is_zero() {
        return capped;
    }
    capped + rand::thread_rng().gen_range(Duration::ZERO..jitter_range)
}
