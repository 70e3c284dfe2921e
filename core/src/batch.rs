//! Batch coalescer.
//!
//! Single-item calls are buffered and handed to a batch function together.
//! A batch is flushed when it reaches `max_batch_size` or when `max_wait` has
//! passed since its first item, whichever comes first. Each caller receives
//! the result at its own position in the returned vector.
//!
//! Flushes swap the buffer out under the lock before the batch function runs,
//! so calls arriving during a flush start the next batch.

use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex};

use tether_types::{BatchOptions, FlowError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::util::{lock, settled};

type Waiter<R, E> = oneshot::Sender<Result<R, FlowError<E>>>;

struct Batch<I, R, E> {
    items: Vec<I>,
    waiters: Vec<Waiter<R, E>>,
}

struct State<I, R, E> {
    items: Vec<I>,
    waiters: Vec<Waiter<R, E>>,
    /// Bumped on every flush so a stale max-wait timer does nothing.
    batch_id: u64,
    timer: Option<JoinHandle<()>>,
}

impl<I, R, E> State<I, R, E> {
    fn take_batch(&mut self) -> Batch<I, R, E> {
        self.batch_id += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        Batch {
            items: mem::take(&mut self.items),
            waiters: mem::take(&mut self.waiters),
        }
    }
}

struct Shared<F, I, R, E> {
    op: F,
    options: BatchOptions,
    state: Mutex<State<I, R, E>>,
}

impl<F, I, R, E, Fut> Shared<F, I, R, E>
where
    F: Fn(Vec<I>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, E>>,
    E: Clone,
{
    async fn flush(&self, batch: Batch<I, R, E>) {
        let expected = batch.items.len();
        if expected == 0 {
            return;
        }
        tracing::debug!(batch_size = expected, "Flushing batch");

        match (self.op)(batch.items).await {
            Ok(results) if results.len() == expected => {
                for (waiter, result) in batch.waiters.into_iter().zip(results) {
                    let _ = waiter.send(Ok(result));
                }
            }
            Ok(results) => {
                tracing::warn!(
                    expected,
                    actual = results.len(),
                    "Batch function returned misaligned results"
                );
                for waiter in batch.waiters {
                    let _ = waiter.send(Err(FlowError::BatchMismatch {
                        expected,
                        actual: results.len(),
                    }));
                }
            }
            Err(err) => {
                for waiter in batch.waiters {
                    let _ = waiter.send(Err(FlowError::Operation(err.clone())));
                }
            }
        }
    }
}

/// Coalesces single-item calls into batched invocations.
pub struct Batcher<F, I, R, E> {
    shared: Arc<Shared<F, I, R, E>>,
}

impl<F, I, R, E> Clone for Batcher<F, I, R, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F, I, R, E, Fut> Batcher<F, I, R, E>
where
    F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
    I: Send + 'static,
    R: Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(op: F, options: BatchOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                op,
                options,
                state: Mutex::new(State {
                    items: Vec::new(),
                    waiters: Vec::new(),
                    batch_id: 0,
                    timer: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &BatchOptions {
        &self.shared.options
    }

    /// Items buffered for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).items.len()
    }

    pub async fn call(&self, item: I) -> Result<R, FlowError<E>> {
        let rx = self.enqueue(item);
        settled(rx).await
    }

    /// Buffer `item`, flushing or arming the max-wait timer as needed.
    fn enqueue(&self, item: I) -> oneshot::Receiver<Result<R, FlowError<E>>> {
        let (tx, rx) = oneshot::channel();
        let mut state = lock(&self.shared.state);
        state.items.push(item);
        state.waiters.push(tx);

        if state.items.len() >= self.shared.options.max_batch_size() {
            let batch = state.take_batch();
            drop(state);
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move { shared.flush(batch).await });
        } else if state.items.len() == 1 {
            let batch_id = state.batch_id;
            let max_wait = self.shared.options.max_wait();
            let shared = Arc::clone(&self.shared);
            state.timer = Some(tokio::spawn(async move {
                sleep(max_wait).await;
                let batch = {
                    let mut state = lock(&shared.state);
                    if state.batch_id != batch_id {
                        return;
                    }
                    state.timer = None;
                    state.take_batch()
                };
                shared.flush(batch).await;
            }));
        }
        rx
    }
}
