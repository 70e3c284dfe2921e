//! Async control-flow combinators for tether.
//!
//! Each module wraps an arbitrary async operation with one resilience or
//! flow-control behavior:
//!
//! - [`retry`]: exponential backoff until success or attempts run out
//! - [`partial`]: settle many operations and report per-item outcomes
//! - [`timeout`]: race an operation against a deadline
//! - [`cancel`]: cooperative cancellation through a shared signal
//! - [`rate_limit`]: sliding-window admission with a bounded FIFO queue
//! - [`debounce`] and [`throttle`]: collapse bursts of calls
//! - [`batch`]: coalesce single-item calls into batch invocations
//! - [`memo`]: size-bounded, optionally expiring result cache
//!
//! Policies and the error taxonomy live in `tether-types` and are re-exported
//! here. The library logs through `tracing` and never installs a subscriber.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Errors are the FlowError taxonomy, documented there
#![allow(clippy::missing_panics_doc)] // No library path panics

pub mod batch;
pub mod cancel;
pub mod debounce;
pub mod memo;
pub mod partial;
pub mod rate_limit;
pub mod retry;
pub mod throttle;
pub mod timeout;
mod util;

pub use batch::Batcher;
pub use cancel::{CancelHandle, CancelSignal, Cancellable, with_cancellation};
pub use debounce::Debouncer;
pub use memo::Memoized;
pub use partial::{PartialResults, with_partial_success};
pub use rate_limit::RateLimiter;
pub use retry::{calculate_retry_delay, with_retry, with_retry_if};
pub use throttle::Throttler;
pub use timeout::{with_timeout, with_timeout_message, with_timeout_policy};

pub use tether_types::{
    BatchOptions, DebounceOptions, FlowError, MemoOptions, PartialSuccessOptions, PolicyError,
    RateLimitPolicy, RetryAttempt, RetryPolicy, ThrottleOptions, TimeoutPolicy,
};
