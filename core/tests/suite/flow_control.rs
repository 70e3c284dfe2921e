//! Rate limiting, debounce and throttle on the virtual clock.

use std::future::{Ready, ready};

use futures_util::future::join_all;

use tether_core::{
    DebounceOptions, Debouncer, FlowError, RateLimitPolicy, RateLimiter, ThrottleOptions,
    Throttler,
};
use tokio::time::{Instant, sleep};

use crate::common::{CallCounter, ms};

type Op = Ready<Result<u32, String>>;

fn counted(calls: CallCounter) -> impl Fn(u32) -> Op + Send + Sync + 'static {
    move |n| {
        calls.hit();
        ready(Ok(n))
    }
}

#[tokio::test(start_paused = true)]
async fn call_over_the_limit_waits_for_the_window() {
    let calls = CallCounter::default();
    let policy = RateLimitPolicy::new(2, ms(100)).unwrap();
    let limiter = RateLimiter::new(counted(calls.clone()), policy);
    let start = Instant::now();

    assert_eq!(limiter.call(1).await, Ok(1));
    assert_eq!(limiter.call(2).await, Ok(2));
    assert!(start.elapsed() < ms(100));

    assert_eq!(limiter.call(3).await, Ok(3));
    assert!(start.elapsed() >= ms(100));
    assert_eq!(calls.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_immediately() {
    let calls = CallCounter::default();
    let policy = RateLimitPolicy::new(1, ms(100))
        .unwrap()
        .with_queue_limit(1);
    let limiter = RateLimiter::new(counted(calls.clone()), policy);
    let start = Instant::now();

    let (granted, queued, rejected) =
        tokio::join!(limiter.call(1), limiter.call(2), limiter.call(3));

    assert_eq!(granted, Ok(1));
    assert_eq!(queued, Ok(2));
    assert_eq!(rejected, Err(FlowError::QueueFull));
    assert!(start.elapsed() >= ms(100));
    assert_eq!(calls.get(), 2);
}

#[tokio::test(start_paused = true)]
async fn debounce_collapses_a_burst() {
    let calls = CallCounter::default();
    let debounced = Debouncer::new(counted(calls.clone()), DebounceOptions::new(ms(50)));

    let mut pending = Vec::new();
    for n in 0..3 {
        let debounced = debounced.clone();
        pending.push(tokio::spawn(async move { debounced.call(n).await }));
        sleep(ms(10)).await;
    }
    for handle in pending {
        assert_eq!(handle.await.unwrap(), Ok(2));
    }
    assert_eq!(calls.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn debounce_max_wait_bounds_latency_under_steady_calls() {
    let calls = CallCounter::default();
    let debounced = Debouncer::new(
        counted(calls.clone()),
        DebounceOptions::new(ms(200)).with_max_wait(ms(100)),
    );

    let mut pending = Vec::new();
    for n in 0..6 {
        let debounced = debounced.clone();
        pending.push(tokio::spawn(async move { debounced.call(n).await }));
        sleep(ms(45)).await;
    }
    let results: Vec<_> = join_all(pending)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(calls.get(), 2);
    assert_eq!(results, vec![Ok(2), Ok(2), Ok(2), Ok(5), Ok(5), Ok(5)]);
}

#[tokio::test(start_paused = true)]
async fn throttle_leading_only_runs_once() {
    let calls = CallCounter::default();
    let throttled = Throttler::new(
        counted(calls.clone()),
        ThrottleOptions::new(ms(100)).with_trailing(false),
    );

    assert_eq!(throttled.call(1).await, Ok(Some(1)));
    assert_eq!(throttled.call(2).await, Ok(Some(1)));
    assert_eq!(throttled.call(3).await, Ok(Some(1)));
    assert_eq!(calls.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn throttle_with_trailing_runs_twice() {
    let calls = CallCounter::default();
    let throttled = Throttler::new(counted(calls.clone()), ThrottleOptions::new(ms(100)));
    let start = Instant::now();

    let (first, second, third) =
        tokio::join!(throttled.call(1), throttled.call(2), throttled.call(3));

    assert_eq!(first, Ok(Some(1)));
    assert_eq!(second, Ok(Some(3)));
    assert_eq!(third, Ok(Some(3)));
    assert!(start.elapsed() >= ms(100));
    assert_eq!(calls.get(), 2);
}
