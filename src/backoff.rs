use rand::Rng;
use std::time::Duration;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is zero-based: the delay before retry N of an item that has
/// already failed N times. Millisecond base because these are in-process
/// network retries, not queue redeliveries.
pub fn retry_delay(attempt: u32, base_delay_ms: u64) -> Duration {
    // Cap the exponent to keep the worst case around a minute with defaults.
    let capped_attempt = attempt.min(7);

    let base_delay = base_delay_ms.saturating_mul(2_u64.saturating_pow(capped_attempt));

    // ±30% jitter so concurrent retries against the same host spread out.
    let jitter_factor = rand::thread_rng().gen_range(0.7..1.3);
    let delay_with_jitter = (base_delay as f64 * jitter_factor).round() as u64;

    Duration::from_millis(delay_with_jitter)
}
