//! Batching and memoization.

use std::future::{Ready, ready};
use std::sync::{Arc, Mutex};

use tether_core::memo::StructuralKey;
use tether_core::{BatchOptions, Batcher, MemoOptions, Memoized};
use tokio::time::{Instant, sleep};

use crate::common::{CallCounter, ms};

type Sizes = Arc<Mutex<Vec<usize>>>;
type Doubled = Ready<Result<Vec<u32>, String>>;

fn doubling_batcher(
    options: BatchOptions,
) -> (
    Sizes,
    Batcher<impl Fn(Vec<u32>) -> Doubled + Send + Sync + 'static, u32, u32, String>,
) {
    let sizes = Sizes::default();
    let record = Arc::clone(&sizes);
    let batcher = Batcher::new(
        move |items: Vec<u32>| {
            record.lock().unwrap().push(items.len());
            let doubled: Vec<u32> = items.into_iter().map(|n| n * 2).collect();
            ready(Ok::<_, String>(doubled))
        },
        options,
    );
    (sizes, batcher)
}

#[tokio::test(start_paused = true)]
async fn overflow_starts_a_second_batch() {
    let (sizes, batcher) = doubling_batcher(BatchOptions::default().with_max_batch_size(3));

    let results = tokio::join!(
        batcher.call(1),
        batcher.call(2),
        batcher.call(3),
        batcher.call(4)
    );

    assert_eq!(results, (Ok(2), Ok(4), Ok(6), Ok(8)));
    assert_eq!(*sizes.lock().unwrap(), vec![3, 1]);
}

#[tokio::test(start_paused = true)]
async fn partial_batch_flushes_after_max_wait() {
    let (sizes, batcher) = doubling_batcher(
        BatchOptions::default()
            .with_max_batch_size(10)
            .with_max_wait(ms(50)),
    );
    let start = Instant::now();

    let results = tokio::join!(batcher.call(5), batcher.call(6));

    assert_eq!(results, (Ok(10), Ok(12)));
    assert_eq!(*sizes.lock().unwrap(), vec![2]);
    assert!(start.elapsed() >= ms(50));
    assert!(start.elapsed() < ms(100));
}

fn counting_memo(
    calls: CallCounter,
    options: MemoOptions,
) -> Memoized<
    impl Fn(String) -> Ready<Result<usize, String>>,
    StructuralKey<String>,
    String,
    usize,
> {
    Memoized::new(
        move |text: String| {
            calls.hit();
            ready(Ok::<_, String>(text.len()))
        },
        options,
    )
}

#[tokio::test(start_paused = true)]
async fn memo_recomputes_after_ttl() {
    let calls = CallCounter::default();
    let memo = counting_memo(calls.clone(), MemoOptions::default().with_ttl(ms(100)));

    assert_eq!(memo.call("hello".to_string()).await, Ok(5));
    sleep(ms(40)).await;
    assert_eq!(memo.call("hello".to_string()).await, Ok(5));
    assert_eq!(calls.get(), 1);

    sleep(ms(60)).await;
    assert_eq!(memo.call("hello".to_string()).await, Ok(5));
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn memo_evicts_oldest_entry_at_capacity() {
    let calls = CallCounter::default();
    let memo = counting_memo(calls.clone(), MemoOptions::default().with_max_size(2));

    for key in ["a", "bb", "ccc"] {
        memo.call(key.to_string()).await.unwrap();
    }
    assert_eq!(calls.get(), 3);
    assert_eq!(memo.len(), 2);

    memo.call("ccc".to_string()).await.unwrap();
    assert_eq!(calls.get(), 3);

    memo.call("a".to_string()).await.unwrap();
    assert_eq!(calls.get(), 4);
}
