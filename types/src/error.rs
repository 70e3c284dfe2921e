//! Error taxonomy shared by every combinator.
//!
//! `FlowError<E>` wraps the wrapped operation's own error type `E` next to the
//! failures the combinators raise themselves. Retry is the one combinator that
//! never wraps: exhausting attempts hands back the operation's last `E` as-is.

use std::time::Duration;

use thiserror::Error;

/// Default message for [`FlowError::TimedOut`].
pub const DEFAULT_TIMEOUT_MESSAGE: &str = "Operation timed out";

/// Failure of a combinator-wrapped operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError<E> {
    /// The wrapped operation failed. Batch failures carry the same error to
    /// every item of the flushed batch.
    #[error("{0}")]
    Operation(E),

    /// Fewer operations succeeded than the configured floor.
    #[error("at least {required} operations must succeed, but only {actual} did")]
    MinSuccessNotMet { required: usize, actual: usize },

    /// The deadline elapsed before the operation settled.
    #[error("{message}")]
    TimedOut { message: String },

    /// The operation failed after its cancellation signal was raised.
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// The rate limiter's wait queue was already at capacity.
    #[error("Rate limit queue is full")]
    QueueFull,

    /// A queued caller was not granted a slot before its wait expired.
    #[error("Rate limit queue timeout after {}ms", .waited.as_millis())]
    QueueTimeout { waited: Duration },

    /// The batch function returned a result list that does not line up with
    /// the flushed items.
    #[error("batch returned {actual} results for {expected} items")]
    BatchMismatch { expected: usize, actual: usize },

    /// The task that owned the pending result went away without settling it.
    #[error("pending operation was abandoned before it settled")]
    Abandoned,
}

impl<E> FlowError<E> {
    #[must_use]
    pub fn timed_out() -> Self {
        Self::TimedOut {
            message: DEFAULT_TIMEOUT_MESSAGE.to_string(),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::QueueTimeout { .. })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The wrapped operation's error, if this failure came from it.
    #[must_use]
    pub const fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }

    /// Convert the operation error while keeping combinator failures intact.
    pub fn map_operation<F, U>(self, f: F) -> FlowError<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Operation(err) => FlowError::Operation(f(err)),
            Self::MinSuccessNotMet { required, actual } => {
                FlowError::MinSuccessNotMet { required, actual }
            }
            Self::TimedOut { message } => FlowError::TimedOut { message },
            Self::Cancelled { reason } => FlowError::Cancelled { reason },
            Self::QueueFull => FlowError::QueueFull,
            Self::QueueTimeout { waited } => FlowError::QueueTimeout { waited },
            Self::BatchMismatch { expected, actual } => {
                FlowError::BatchMismatch { expected, actual }
            }
            Self::Abandoned => FlowError::Abandoned,
        }
    }
}

impl<E> From<E> for FlowError<E> {
    fn from(err: E) -> Self {
        Self::Operation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_success_message_names_both_counts() {
        let err: FlowError<String> = FlowError::MinSuccessNotMet {
            required: 3,
            actual: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn cancelled_message_embeds_reason() {
        let err: FlowError<String> = FlowError::Cancelled {
            reason: "User cancelled".to_string(),
        };
        assert_eq!(err.to_string(), "Operation cancelled: User cancelled");
    }

    #[test]
    fn operation_error_displays_verbatim() {
        let err = FlowError::Operation("upstream 503".to_string());
        assert_eq!(err.to_string(), "upstream 503");
        assert_eq!(err.operation().map(String::as_str), Some("upstream 503"));
    }

    #[test]
    fn default_timeout_message() {
        let err: FlowError<String> = FlowError::timed_out();
        assert_eq!(err.to_string(), DEFAULT_TIMEOUT_MESSAGE);
        assert!(err.is_timeout());
    }

    #[test]
    fn map_operation_keeps_combinator_failures() {
        let err: FlowError<u8> = FlowError::QueueFull;
        assert_eq!(err.map_operation(u32::from), FlowError::<u32>::QueueFull);

        let err = FlowError::Operation(7u8);
        assert_eq!(err.map_operation(u32::from), FlowError::Operation(7u32));
    }
}
