//! Debounce: collapse a burst of calls into one execution.
//!
//! Every call restarts a `wait` timer; when it finally elapses the operation
//! runs once with the most recent argument and every caller from that window
//! receives the same result. Options:
//!
//! - `leading`: the first call after an idle period runs immediately and gets
//!   its own result; calls that follow inside `wait` form a trailing window.
//! - `max_wait`: a second timer, started when a window opens, forces the
//!   flush even while calls keep arriving.
//!
//! Timer tasks carry the window and call generation they were armed for and
//! do nothing if either moved on. A flush runs inside the timer task that
//! claimed it, so callers that drop their future never strand the others.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tether_types::{DebounceOptions, FlowError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::util::{lock, settled};

type Waiter<T, E> = oneshot::Sender<Result<T, FlowError<E>>>;

enum Admission<A, T, E> {
    Leading(A),
    Window(oneshot::Receiver<Result<T, FlowError<E>>>),
}

struct Pending<A, T, E> {
    arg: A,
    waiters: Vec<Waiter<T, E>>,
}

struct State<A, T, E> {
    pending: Option<Pending<A, T, E>>,
    /// Bumped on every debounced call; a trailing timer only fires for the
    /// call that armed it.
    generation: u64,
    /// Bumped on every flush.
    window: u64,
    last_call: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    max_timer: Option<JoinHandle<()>>,
}

impl<A, T, E> State<A, T, E> {
    /// Claim the open window for execution and disarm both timers.
    fn take_window(&mut self) -> Option<Pending<A, T, E>> {
        self.window += 1;
        for handle in [self.timer.take(), self.max_timer.take()].into_iter().flatten() {
            handle.abort();
        }
        self.pending.take()
    }
}

struct Shared<F, A, T, E> {
    op: F,
    options: DebounceOptions,
    state: Mutex<State<A, T, E>>,
}

impl<F, A, T, E, Fut> Shared<F, A, T, E>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Clone,
    E: Clone,
{
    async fn run(&self, pending: Pending<A, T, E>) {
        let callers = pending.waiters.len();
        let result = (self.op)(pending.arg).await.map_err(FlowError::Operation);
        tracing::trace!(callers, ok = result.is_ok(), "Debounced call settled");
        for waiter in pending.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Wraps an operation so bursts of calls run it once.
pub struct Debouncer<F, A, T, E> {
    shared: Arc<Shared<F, A, T, E>>,
}

impl<F, A, T, E> Clone for Debouncer<F, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F, A, T, E, Fut> Debouncer<F, A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: Send + 'static,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(op: F, options: DebounceOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                op,
                options,
                state: Mutex::new(State {
                    pending: None,
                    generation: 0,
                    window: 0,
                    last_call: None,
                    timer: None,
                    max_timer: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &DebounceOptions {
        &self.shared.options
    }

    /// Whether a window is collecting calls right now.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.shared.state).pending.is_some()
    }

    pub async fn call(&self, arg: A) -> Result<T, FlowError<E>> {
        match self.admit(arg) {
            Admission::Leading(arg) => {
                tracing::trace!("Debounce leading edge");
                (self.shared.op)(arg).await.map_err(FlowError::Operation)
            }
            Admission::Window(rx) => settled(rx).await,
        }
    }

    /// Join or open the current window and re-arm its timers. Never awaits.
    fn admit(&self, arg: A) -> Admission<A, T, E> {
        let wait = self.shared.options.wait();
        let now = Instant::now();
        let mut state = lock(&self.shared.state);

        let idle = state.pending.is_none()
            && state
                .last_call
                .is_none_or(|at| now.saturating_duration_since(at) >= wait);
        state.last_call = Some(now);

        if idle && self.shared.options.leading() {
            return Admission::Leading(arg);
        }

        let (tx, rx) = oneshot::channel();
        let opened = match state.pending.as_mut() {
            Some(pending) => {
                pending.arg = arg;
                pending.waiters.push(tx);
                false
            }
            None => {
                state.pending = Some(Pending {
                    arg,
                    waiters: vec![tx],
                });
                true
            }
        };

        state.generation += 1;
        let generation = state.generation;
        let window = state.window;

        if let Some(previous) = state.timer.take() {
            previous.abort();
        }
        let shared = Arc::clone(&self.shared);
        state.timer = Some(tokio::spawn(async move {
            sleep(wait).await;
            let claimed = {
                let mut state = lock(&shared.state);
                if state.window != window || state.generation != generation {
                    return;
                }
                // Drop our own handle before disarming so we do not abort ourselves.
                state.timer = None;
                state.take_window()
            };
            if let Some(pending) = claimed {
                shared.run(pending).await;
            }
        }));

        if opened && let Some(max_wait) = self.shared.options.max_wait() {
            let shared = Arc::clone(&self.shared);
            state.max_timer = Some(tokio::spawn(async move {
                sleep(max_wait).await;
                let claimed = {
                    let mut state = lock(&shared.state);
                    if state.window != window {
                        return;
                    }
                    state.max_timer = None;
                    state.take_window()
                };
                if let Some(pending) = claimed {
                    tracing::trace!("Debounce max_wait reached, forcing flush");
                    shared.run(pending).await;
                }
            }));
        }
        Admission::Window(rx)
    }
}
