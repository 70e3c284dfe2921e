//! Validated combinator policies.
//!
//! Each policy is valid by construction. Builder methods clamp out-of-range
//! inputs; the serde boundary (`#[serde(try_from)]`) rejects them instead, so a
//! bad config file fails loudly rather than being silently corrected.
//!
//! Raw deserialization structs carry durations as integer milliseconds with
//! `Option` fields; missing fields take the same defaults as `Default`.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("backoff_factor must be a finite number >= 1.0 (got {0})")]
    BackoffFactor(String),
    #[error("jitter must be within [0.0, 1.0] (got {0})")]
    Jitter(String),
    #[error("max_delay_ms ({max}) must not be below initial_delay_ms ({initial})")]
    DelayOrder { initial: u64, max: u64 },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("timeout message must not be empty")]
    EmptyMessage,
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn non_zero(field: &'static str, value: u64) -> Result<u64, PolicyError> {
    if value == 0 {
        Err(PolicyError::Zero { field })
    } else {
        Ok(value)
    }
}

// ============================================================================
// Retry
// ============================================================================

/// One scheduled retry: the attempt that just failed and the pause before the
/// next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub delay: Duration,
}

/// Exponential backoff policy.
///
/// `delay(attempt) = min(initial_delay * backoff_factor^(attempt - 1), max_delay)`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Total attempts including the first. Clamped to at least 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Clamped to at least 1.0; non-finite values fall back to 1.0.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_finite() {
            factor.max(1.0)
        } else {
            1.0
        };
        self
    }

    /// Down-jitter factor: each delay is scaled by a random value in
    /// `[1 - jitter, 1]`. Clamped to `[0, 1]`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    #[must_use]
    pub const fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    #[must_use]
    pub const fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Un-jittered pause after `attempt` (1-based) fails.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !base.is_finite() || base >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(base)
    }

    #[must_use]
    pub fn attempt(&self, attempt: u32) -> RetryAttempt {
        RetryAttempt {
            attempt,
            delay: self.delay_for_attempt(attempt),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetryPolicy {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    backoff_factor: Option<f64>,
    jitter: Option<f64>,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let max_attempts = raw.max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        let backoff_factor = raw.backoff_factor.unwrap_or(defaults.backoff_factor);
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(PolicyError::BackoffFactor(backoff_factor.to_string()));
        }
        let jitter = raw.jitter.unwrap_or(defaults.jitter);
        if !(0.0..=1.0).contains(&jitter) {
            return Err(PolicyError::Jitter(jitter.to_string()));
        }
        let initial = raw
            .initial_delay_ms
            .unwrap_or(defaults.initial_delay.as_millis() as u64);
        let max = raw
            .max_delay_ms
            .unwrap_or(defaults.max_delay.as_millis() as u64);
        if max < initial {
            return Err(PolicyError::DelayOrder { initial, max });
        }
        Ok(Self {
            max_attempts,
            initial_delay: millis(initial),
            max_delay: millis(max),
            backoff_factor,
            jitter,
        })
    }
}

// ============================================================================
// Partial success
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPartialSuccessOptions")]
pub struct PartialSuccessOptions {
    require_min_success: usize,
    timeout: Option<Duration>,
}

impl PartialSuccessOptions {
    #[must_use]
    pub fn with_require_min_success(mut self, floor: usize) -> Self {
        self.require_min_success = floor;
        self
    }

    /// Per-item deadline; each item races its own timer.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn require_min_success(&self) -> usize {
        self.require_min_success
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPartialSuccessOptions {
    #[serde(default)]
    require_min_success: usize,
    timeout_ms: Option<u64>,
}

impl TryFrom<RawPartialSuccessOptions> for PartialSuccessOptions {
    type Error = PolicyError;

    fn try_from(raw: RawPartialSuccessOptions) -> Result<Self, Self::Error> {
        let timeout = raw
            .timeout_ms
            .map(|ms| non_zero("timeout_ms", ms).map(millis))
            .transpose()?;
        Ok(Self {
            require_min_success: raw.require_min_success,
            timeout,
        })
    }
}

// ============================================================================
// Timeout
// ============================================================================

/// A deadline with an optional caller-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTimeoutPolicy")]
pub struct TimeoutPolicy {
    duration: Duration,
    message: Option<String>,
}

impl TimeoutPolicy {
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTimeoutPolicy {
    timeout_ms: u64,
    message: Option<String>,
}

impl TryFrom<RawTimeoutPolicy> for TimeoutPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawTimeoutPolicy) -> Result<Self, Self::Error> {
        let duration = millis(non_zero("timeout_ms", raw.timeout_ms)?);
        if raw.message.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(PolicyError::EmptyMessage);
        }
        Ok(Self {
            duration,
            message: raw.message,
        })
    }
}

// ============================================================================
// Rate limit
// ============================================================================

/// Sliding-window rate limit: at most `max_calls` grants in any trailing
/// `window`, with up to `queue_limit` callers waiting for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRateLimitPolicy")]
pub struct RateLimitPolicy {
    max_calls: usize,
    window: Duration,
    queue_limit: usize,
}

impl RateLimitPolicy {
    pub fn new(max_calls: usize, window: Duration) -> Result<Self, PolicyError> {
        if max_calls == 0 {
            return Err(PolicyError::Zero { field: "max_calls" });
        }
        if window.is_zero() {
            return Err(PolicyError::Zero { field: "window_ms" });
        }
        Ok(Self {
            max_calls,
            window,
            queue_limit: max_calls.saturating_mul(2),
        })
    }

    /// Zero means callers are never queued: a full window rejects at once.
    #[must_use]
    pub fn with_queue_limit(mut self, queue_limit: usize) -> Self {
        self.queue_limit = queue_limit;
        self
    }

    #[must_use]
    pub const fn max_calls(&self) -> usize {
        self.max_calls
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub const fn queue_limit(&self) -> usize {
        self.queue_limit
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRateLimitPolicy {
    max_calls: usize,
    window_ms: u64,
    queue_limit: Option<usize>,
}

impl TryFrom<RawRateLimitPolicy> for RateLimitPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawRateLimitPolicy) -> Result<Self, Self::Error> {
        let policy = Self::new(raw.max_calls, millis(raw.window_ms))?;
        Ok(match raw.queue_limit {
            Some(limit) => policy.with_queue_limit(limit),
            None => policy,
        })
    }
}

// ============================================================================
// Debounce
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDebounceOptions")]
pub struct DebounceOptions {
    wait: Duration,
    max_wait: Option<Duration>,
    leading: bool,
}

impl DebounceOptions {
    #[must_use]
    pub const fn new(wait: Duration) -> Self {
        Self {
            wait,
            max_wait: None,
            leading: false,
        }
    }

    /// Upper bound on how long a continuous burst can postpone execution.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    #[must_use]
    pub fn with_leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    #[must_use]
    pub const fn wait(&self) -> Duration {
        self.wait
    }

    #[must_use]
    pub const fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    #[must_use]
    pub const fn leading(&self) -> bool {
        self.leading
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDebounceOptions {
    wait_ms: u64,
    max_wait_ms: Option<u64>,
    #[serde(default)]
    leading: bool,
}

impl TryFrom<RawDebounceOptions> for DebounceOptions {
    type Error = PolicyError;

    fn try_from(raw: RawDebounceOptions) -> Result<Self, Self::Error> {
        let wait = non_zero("wait_ms", raw.wait_ms)?;
        Ok(Self {
            wait: millis(wait),
            max_wait: raw.max_wait_ms.map(millis),
            leading: raw.leading,
        })
    }
}

// ============================================================================
// Throttle
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawThrottleOptions")]
pub struct ThrottleOptions {
    wait: Duration,
    leading: bool,
    trailing: bool,
}

impl ThrottleOptions {
    #[must_use]
    pub const fn new(wait: Duration) -> Self {
        Self {
            wait,
            leading: true,
            trailing: true,
        }
    }

    #[must_use]
    pub fn with_leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    #[must_use]
    pub fn with_trailing(mut self, trailing: bool) -> Self {
        self.trailing = trailing;
        self
    }

    #[must_use]
    pub const fn wait(&self) -> Duration {
        self.wait
    }

    #[must_use]
    pub const fn leading(&self) -> bool {
        self.leading
    }

    #[must_use]
    pub const fn trailing(&self) -> bool {
        self.trailing
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThrottleOptions {
    wait_ms: u64,
    #[serde(default = "default_true")]
    leading: bool,
    #[serde(default = "default_true")]
    trailing: bool,
}

impl TryFrom<RawThrottleOptions> for ThrottleOptions {
    type Error = PolicyError;

    fn try_from(raw: RawThrottleOptions) -> Result<Self, Self::Error> {
        let wait = non_zero("wait_ms", raw.wait_ms)?;
        Ok(Self {
            wait: millis(wait),
            leading: raw.leading,
            trailing: raw.trailing,
        })
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBatchOptions")]
pub struct BatchOptions {
    max_batch_size: usize,
    max_wait: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_wait: Duration::from_millis(100),
        }
    }
}

impl BatchOptions {
    /// Clamped to at least 1.
    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    #[must_use]
    pub const fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBatchOptions {
    max_batch_size: Option<usize>,
    max_wait_ms: Option<u64>,
}

impl TryFrom<RawBatchOptions> for BatchOptions {
    type Error = PolicyError;

    fn try_from(raw: RawBatchOptions) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let max_batch_size = raw.max_batch_size.unwrap_or(defaults.max_batch_size);
        if max_batch_size == 0 {
            return Err(PolicyError::Zero {
                field: "max_batch_size",
            });
        }
        Ok(Self {
            max_batch_size,
            max_wait: raw.max_wait_ms.map_or(defaults.max_wait, millis),
        })
    }
}

// ============================================================================
// Memoize
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawMemoOptions")]
pub struct MemoOptions {
    max_size: usize,
    ttl: Option<Duration>,
}

impl Default for MemoOptions {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl: None,
        }
    }
}

impl MemoOptions {
    /// Clamped to at least 1.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Entries older than `ttl` are treated as absent.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMemoOptions {
    max_size: Option<usize>,
    ttl_ms: Option<u64>,
}

impl TryFrom<RawMemoOptions> for MemoOptions {
    type Error = PolicyError;

    fn try_from(raw: RawMemoOptions) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let max_size = raw.max_size.unwrap_or(defaults.max_size);
        if max_size == 0 {
            return Err(PolicyError::Zero { field: "max_size" });
        }
        let ttl = raw
            .ttl_ms
            .map(|ms| non_zero("ttl_ms", ms).map(millis))
            .transpose()?;
        Ok(Self { max_size, ttl })
    }
}
