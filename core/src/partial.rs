//! Partial-success aggregation.
//!
//! Drives every future to settlement and reports each outcome in input order.
//! A failing item never short-circuits the rest; the success floor is checked
//! only once everything has settled.

use std::future::Future;

use futures_util::future::join_all;
use tether_types::{FlowError, PartialSuccessOptions};

use crate::timeout::with_timeout;

/// Settled outcomes, index-aligned with the input futures.
#[derive(Debug)]
pub struct PartialResults<T, E> {
    pub results: Vec<Result<T, FlowError<E>>>,
    pub successful: usize,
    pub failed: usize,
}

impl<T, E> PartialResults<T, E> {
    /// Successful values with their input positions.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().ok().map(|v| (i, v)))
    }

    /// Failures with their input positions.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &FlowError<E>)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    /// Successful values in input order, dropping failures.
    #[must_use]
    pub fn into_values(self) -> Vec<T> {
        self.results.into_iter().filter_map(Result::ok).collect()
    }
}

/// Settle every future, optionally racing each against its own timeout.
///
/// Fails with [`FlowError::MinSuccessNotMet`] when fewer than
/// `require_min_success` items succeeded.
pub async fn with_partial_success<I, Fut, T, E>(
    futures: I,
    options: &PartialSuccessOptions,
) -> Result<PartialResults<T, E>, FlowError<E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let timeout = options.timeout();
    let settled = join_all(futures.into_iter().map(|fut| async move {
        match timeout {
            Some(limit) => with_timeout(fut, limit).await,
            None => fut.await.map_err(FlowError::Operation),
        }
    }))
    .await;

    let successful = settled.iter().filter(|r| r.is_ok()).count();
    let failed = settled.len() - successful;
    tracing::debug!(successful, failed, "Partial-success batch settled");

    let required = options.require_min_success();
    if successful < required {
        return Err(FlowError::MinSuccessNotMet {
            required,
            actual: successful,
        });
    }

    Ok(PartialResults {
        results: settled,
        successful,
        failed,
    })
}
