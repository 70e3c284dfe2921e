//! Small shared helpers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use tether_types::FlowError;

/// Lock combinator state.
///
/// Critical sections never await and never run user code, so a poisoned lock
/// still guards consistent data and is recovered rather than propagated.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Await a result delivered by a flush task. A dropped sender means the task
/// died before settling this caller.
pub(crate) async fn settled<T, E>(
    rx: oneshot::Receiver<Result<T, FlowError<E>>>,
) -> Result<T, FlowError<E>> {
    rx.await.unwrap_or(Err(FlowError::Abandoned))
}
