//! Retry with exponential backoff.
//!
//! # Policy
//!
//! - Attempts: `max_attempts` total, counting the first (default 3)
//! - Delay after attempt `n` fails: `min(initial_delay * backoff_factor^(n-1), max_delay)`
//! - Optional down-jitter: delay scaled by a factor in `[1 - jitter, 1.0]`
//!
//! # Termination
//!
//! - First success returns immediately
//! - A non-retryable error returns immediately
//! - The error from the final attempt is returned unchanged, never wrapped
//!
//! Each scheduled retry emits a `warn` event carrying the attempt number, the
//! delay, and the error message.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tether_types::{RetryAttempt, RetryPolicy};
use tokio::time::sleep;

/// Delay before the retry that follows failed `attempt` (1-based), with the
/// policy's jitter applied.
#[must_use]
pub fn calculate_retry_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base = policy.delay_for_attempt(attempt);
    if policy.jitter() <= 0.0 {
        return base;
    }

    // Down-jitter: multiply by random factor in [1 - jitter, 1.0]
    let jitter = 1.0 - rand::random::<f64>() * policy.jitter();
    base.mul_f64(jitter)
}

/// Run `op` until it succeeds or the policy gives up. Every error is retryable.
pub async fn with_retry<T, E, F, Fut>(op: F, policy: &RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_retry_if(op, policy, |_| true).await
}

/// Run `op` until it succeeds, the policy gives up, or `is_retryable` rejects
/// an error.
///
/// `op` is called once per attempt so every attempt gets a fresh future.
pub async fn with_retry_if<T, E, F, Fut, P>(
    mut op: F,
    policy: &RetryPolicy,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retryable(&err) {
            tracing::debug!(attempt, error = %err, "Error is not retryable");
            return Err(err);
        }
        if attempt >= max_attempts {
            tracing::debug!(attempt, error = %err, "Retry attempts exhausted");
            return Err(err);
        }

        let next = RetryAttempt {
            attempt,
            delay: calculate_retry_delay(attempt, policy),
        };
        tracing::warn!(
            attempt = next.attempt,
            max_attempts,
            delay_ms = next.delay.as_millis() as u64,
            error = %err,
            "Retrying operation after failure"
        );
        sleep(next.delay).await;
        attempt += 1;
    }
}
