//! Throttle: at most one execution per `wait` period.
//!
//! A call made `wait` or more after the previous execution runs immediately
//! (leading edge) and its success is remembered. Calls inside the period:
//!
//! - with `trailing`, join the single trailing execution scheduled for the end
//!   of the period; it runs with the most recent argument and every joined
//!   caller receives its result
//! - without `trailing`, return the remembered result (`None` before any
//!   success)
//!
//! With `leading` off, the very first call goes to the scheduled path instead
//! of running immediately.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tether_types::{FlowError, ThrottleOptions};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};

use crate::util::{lock, settled};

type Waiter<T, E> = oneshot::Sender<Result<T, FlowError<E>>>;

enum Admission<A, T, E> {
    /// Leading edge or window elapsed: run now.
    Execute(A),
    /// Suppressed with no trailing edge.
    Replay(Option<T>),
    Trailing(oneshot::Receiver<Result<T, FlowError<E>>>),
}

struct Trailing<A, T, E> {
    arg: A,
    waiters: Vec<Waiter<T, E>>,
}

struct State<A, T, E> {
    last_exec: Option<Instant>,
    last_result: Option<T>,
    trailing: Option<Trailing<A, T, E>>,
}

struct Shared<F, A, T, E> {
    op: F,
    options: ThrottleOptions,
    state: Mutex<State<A, T, E>>,
}

impl<F, A, T, E, Fut> Shared<F, A, T, E>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Clone,
{
    async fn execute(&self, arg: A) -> Result<T, E> {
        let result = (self.op)(arg).await;
        if let Ok(value) = &result {
            lock(&self.state).last_result = Some(value.clone());
        }
        result
    }

    async fn fire_trailing(&self)
    where
        E: Clone,
    {
        let trailing = {
            let mut state = lock(&self.state);
            let Some(trailing) = state.trailing.take() else {
                return;
            };
            state.last_exec = Some(Instant::now());
            trailing
        };
        tracing::trace!(callers = trailing.waiters.len(), "Throttle trailing edge");
        let result = self.execute(trailing.arg).await.map_err(FlowError::Operation);
        for waiter in trailing.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Wraps an operation so it runs at most once per `wait`.
pub struct Throttler<F, A, T, E> {
    shared: Arc<Shared<F, A, T, E>>,
}

impl<F, A, T, E> Clone for Throttler<F, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F, A, T, E, Fut> Throttler<F, A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: Send + 'static,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(op: F, options: ThrottleOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                op,
                options,
                state: Mutex::new(State {
                    last_exec: None,
                    last_result: None,
                    trailing: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ThrottleOptions {
        &self.shared.options
    }

    /// The most recent successful result, if any.
    #[must_use]
    pub fn last_result(&self) -> Option<T> {
        lock(&self.shared.state).last_result.clone()
    }

    pub async fn call(&self, arg: A) -> Result<Option<T>, FlowError<E>> {
        match self.admit(arg) {
            Admission::Execute(arg) => self
                .shared
                .execute(arg)
                .await
                .map(Some)
                .map_err(FlowError::Operation),
            Admission::Replay(last) => Ok(last),
            Admission::Trailing(rx) => settled(rx).await.map(Some),
        }
    }

    /// Decide this call's path under the lock. Never awaits.
    fn admit(&self, arg: A) -> Admission<A, T, E> {
        let options = &self.shared.options;
        let wait = options.wait();
        let now = Instant::now();
        let mut state = lock(&self.shared.state);

        let first = state.last_exec.is_none();
        let window_open = match state.last_exec {
            Some(at) => now.saturating_duration_since(at) >= wait,
            None => options.leading(),
        };

        if window_open {
            state.last_exec = Some(now);
            return Admission::Execute(arg);
        }

        if !options.trailing() && !first {
            return Admission::Replay(state.last_result.clone());
        }

        let (tx, rx) = oneshot::channel();
        match state.trailing.as_mut() {
            Some(trailing) => {
                trailing.arg = arg;
                trailing.waiters.push(tx);
            }
            None => {
                state.trailing = Some(Trailing {
                    arg,
                    waiters: vec![tx],
                });
                let delay = state
                    .last_exec
                    .map_or(wait, |at| wait.saturating_sub(now.saturating_duration_since(at)));
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    sleep(delay).await;
                    shared.fire_trailing().await;
                });
            }
        }
        Admission::Trailing(rx)
    }
}
