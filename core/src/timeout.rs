//! Deadline guard for a single future.
//!
//! On expiry the future is dropped at its current suspension point and the
//! caller gets [`FlowError::TimedOut`]. Anything the future already handed off
//! (spawned tasks, requests in flight elsewhere) keeps running; pair with
//! [`crate::cancel`] when the work itself has to stop.

use std::future::Future;
use std::time::Duration;

use tether_types::{DEFAULT_TIMEOUT_MESSAGE, FlowError, TimeoutPolicy};
use tokio::time::timeout;

pub async fn with_timeout<T, E, Fut>(fut: Fut, limit: Duration) -> Result<T, FlowError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    with_timeout_message(fut, limit, DEFAULT_TIMEOUT_MESSAGE).await
}

pub async fn with_timeout_message<T, E, Fut>(
    fut: Fut,
    limit: Duration,
    message: impl Into<String>,
) -> Result<T, FlowError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result.map_err(FlowError::Operation),
        Err(_elapsed) => {
            let message = message.into();
            tracing::debug!(
                limit_ms = limit.as_millis() as u64,
                reason = %message,
                "Operation timed out"
            );
            Err(FlowError::TimedOut { message })
        }
    }
}

/// Apply a configured [`TimeoutPolicy`].
pub async fn with_timeout_policy<T, E, Fut>(
    fut: Fut,
    policy: &TimeoutPolicy,
) -> Result<T, FlowError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    let message = policy.message().unwrap_or(DEFAULT_TIMEOUT_MESSAGE);
    with_timeout_message(fut, policy.duration(), message).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn custom_message_is_reported() {
        let result: Result<(), FlowError<String>> = with_timeout_message(
            async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(10),
            "tts provider did not answer",
        )
        .await;

        assert_eq!(
            result,
            Err(FlowError::TimedOut {
                message: "tts provider did not answer".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn operation_error_passes_through() {
        let result: Result<(), FlowError<&str>> =
            with_timeout(async { Err("boom") }, Duration::from_millis(10)).await;
        assert_eq!(result, Err(FlowError::Operation("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn policy_without_message_uses_default() {
        let policy = TimeoutPolicy::new(Duration::from_millis(5));
        let result: Result<(), FlowError<String>> = with_timeout_policy(
            async {
                sleep(Duration::from_millis(50)).await;
                Ok(())
            },
            &policy,
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), DEFAULT_TIMEOUT_MESSAGE);
    }
}
