//! Cooperative cancellation.
//!
//! [`with_cancellation`] spawns an operation with a fresh [`CancelSignal`] and
//! hands back a [`Cancellable`]. Cancelling only raises the signal: the
//! operation has to look at it (`is_aborted`, `check`, or by racing
//! `cancelled()`) at points where stopping is safe. Code that never looks runs
//! to completion.
//!
//! A failure the operation returns while the signal is raised is reported as
//! [`FlowError::Cancelled`] carrying the cancel reason. Failures are classified
//! inside the task the moment they happen, so cancelling after the operation
//! already failed leaves its error untouched. A success that arrives after
//! cancellation is still returned.

use std::future::Future;
use std::panic;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tether_types::FlowError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Reason recorded by [`CancelHandle::abort`].
pub const DEFAULT_CANCEL_REASON: &str = "cancelled by caller";

#[derive(Debug, Default)]
struct SignalState {
    aborted: AtomicBool,
    reason: OnceLock<String>,
    notify: Notify,
}

/// Read side of a cancellation: `{aborted, reason}`, raised at most once.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    state: Arc<SignalState>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        if self.is_aborted() {
            self.state.reason.get().map(String::as_str)
        } else {
            None
        }
    }

    /// `Err(Cancelled)` once the signal is raised. Meant for `?` at safe points.
    pub fn check<E>(&self) -> Result<(), FlowError<E>> {
        match self.reason() {
            Some(reason) => Err(FlowError::Cancelled {
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Resolves once the signal is raised.
    pub async fn cancelled(&self) {
        let mut notified = pin!(self.state.notify.notified());
        // Register before checking the flag so a concurrent raise is not missed.
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }

    /// Returns `false` if the signal had already been raised.
    fn raise(&self, reason: String) -> bool {
        if self.state.reason.set(reason).is_err() {
            return false;
        }
        self.state.aborted.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
        true
    }
}

/// Write side of a cancellation. Cheap to clone and hand to other tasks.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: CancelSignal,
}

impl CancelHandle {
    /// Raise the signal. The first reason wins; later calls are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.signal.raise(reason.clone()) {
            tracing::debug!(%reason, "Cancellation requested");
        }
    }

    /// Raise the signal with [`DEFAULT_CANCEL_REASON`].
    pub fn abort(&self) {
        self.cancel(DEFAULT_CANCEL_REASON);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_aborted()
    }
}

/// A running operation paired with the means to cancel it.
#[derive(Debug)]
pub struct Cancellable<T, E> {
    task: JoinHandle<Result<T, FlowError<E>>>,
    handle: CancelHandle,
}

impl<T, E> Cancellable<T, E> {
    pub fn cancel(&self, reason: impl Into<String>) {
        self.handle.cancel(reason);
    }

    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn signal(&self) -> &CancelSignal {
        &self.handle.signal
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the operation to settle.
    ///
    /// A panic inside the operation is resumed on the caller.
    pub async fn result(self) -> Result<T, FlowError<E>> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(join_err) if join_err.is_panic() => panic::resume_unwind(join_err.into_panic()),
            Err(_) => Err(FlowError::Abandoned),
        }
    }
}

/// Start `op` right away with a fresh cancellation signal.
pub fn with_cancellation<F, Fut, T, E>(op: F) -> Cancellable<T, E>
where
    F: FnOnce(CancelSignal) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let signal = CancelSignal::new();
    let running = op(signal.clone());
    let observer = signal.clone();
    let task = tokio::spawn(async move {
        running.await.map_err(|err| match observer.reason() {
            Some(reason) => FlowError::Cancelled {
                reason: reason.to_string(),
            },
            None => FlowError::Operation(err),
        })
    });
    Cancellable {
        task,
        handle: CancelHandle { signal },
    }
}
