//! Sliding-window rate limiter with a bounded FIFO wait queue.
//!
//! # Admission
//!
//! Each call first evicts grants older than the trailing `window`. With fewer
//! than `max_calls` grants left, the call proceeds at once and its instant is
//! recorded. Otherwise the caller must wait `oldest + window - now`:
//!
//! - queue already at `queue_limit`: fail with [`FlowError::QueueFull`], no wait
//! - else enqueue and start a service timer for `wait`
//!
//! When a service timer fires it grants the queue front (FIFO by enqueue),
//! dropping the oldest recorded instant and recording the grant time. A queued
//! caller gives up after `wait + 1s` with [`FlowError::QueueTimeout`].
//!
//! `wait` is computed once at enqueue and is not re-checked against the window
//! when the timer fires; the one-second buffer is the tolerance for that.
//! Bursts of `max_calls` are possible at window edges: this is a sliding log,
//! not a token bucket.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_types::{FlowError, RateLimitPolicy};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep, timeout};

use crate::util::lock;

/// Extra time a queued caller waits past its computed slot before giving up.
pub const QUEUE_TIMEOUT_BUFFER: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct Window {
    /// Grant instants, oldest first. Never longer than `max_calls`.
    calls: VecDeque<Instant>,
    queue: VecDeque<Waiter>,
    next_id: u64,
}

impl Window {
    fn evict_expired(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Grant the oldest waiter that is still listening.
    fn service_front(&mut self) {
        while let Some(waiter) = self.queue.pop_front() {
            if waiter.grant.send(()).is_ok() {
                self.calls.pop_front();
                self.calls.push_back(Instant::now());
                tracing::trace!(
                    waiter = waiter.id,
                    queued = self.queue.len(),
                    "Rate limit slot granted"
                );
                return;
            }
        }
    }

    fn remove(&mut self, id: u64) {
        self.queue.retain(|waiter| waiter.id != id);
    }
}

enum Admission {
    Granted,
    Queued(QueueTicket),
}

/// A place in the wait queue. Dropping it gives the place up.
struct QueueTicket {
    window: Arc<Mutex<Window>>,
    id: u64,
    wait: Duration,
    grant: oneshot::Receiver<()>,
}

impl QueueTicket {
    async fn wait_for_grant<E>(mut self) -> Result<(), FlowError<E>> {
        let waited = self.wait + QUEUE_TIMEOUT_BUFFER;
        match timeout(waited, &mut self.grant).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(FlowError::Abandoned),
            Err(_) => {
                tracing::debug!(
                    waiter = self.id,
                    waited_ms = waited.as_millis() as u64,
                    "Rate limit queue wait expired"
                );
                Err(FlowError::QueueTimeout { waited })
            }
        }
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        lock(&self.window).remove(self.id);
    }
}

/// Wraps an operation so at most `max_calls` invocations start in any
/// trailing `window`.
pub struct RateLimiter<F> {
    op: F,
    policy: RateLimitPolicy,
    window: Arc<Mutex<Window>>,
}

impl<F> RateLimiter<F> {
    pub fn new(op: F, policy: RateLimitPolicy) -> Self {
        Self {
            op,
            policy,
            window: Arc::default(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Callers currently waiting for a slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        lock(&self.window).queue.len()
    }

    /// Grants still inside the trailing window.
    #[must_use]
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        let window = self.policy.window();
        lock(&self.window)
            .calls
            .iter()
            .filter(|&&at| now.saturating_duration_since(at) < window)
            .count()
    }

    pub async fn call<A, Fut, T, E>(&self, arg: A) -> Result<T, FlowError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Admission::Queued(ticket) = self.admit()? {
            ticket.wait_for_grant().await?;
        }
        (self.op)(arg).await.map_err(FlowError::Operation)
    }

    fn admit<E>(&self) -> Result<Admission, FlowError<E>> {
        let now = Instant::now();
        let window_len = self.policy.window();
        let mut window = lock(&self.window);
        window.evict_expired(now, window_len);

        if window.calls.len() < self.policy.max_calls() {
            window.calls.push_back(now);
            return Ok(Admission::Granted);
        }

        if window.queue.len() >= self.policy.queue_limit() {
            tracing::debug!(
                queued = window.queue.len(),
                queue_limit = self.policy.queue_limit(),
                "Rate limit queue is full"
            );
            return Err(FlowError::QueueFull);
        }

        let wait = window.calls.front().map_or(Duration::ZERO, |&oldest| {
            (oldest + window_len).saturating_duration_since(now)
        });

        let id = window.next_id;
        window.next_id += 1;
        let (tx, rx) = oneshot::channel();
        window.queue.push_back(Waiter { id, grant: tx });
        tracing::debug!(
            waiter = id,
            wait_ms = wait.as_millis() as u64,
            queued = window.queue.len(),
            "Rate limit reached, queueing call"
        );
        drop(window);

        let service = Arc::clone(&self.window);
        tokio::spawn(async move {
            sleep(wait).await;
            lock(&service).service_front();
        });

        Ok(Admission::Queued(QueueTicket {
            window: Arc::clone(&self.window),
            id,
            wait,
            grant: rx,
        }))
    }
}
