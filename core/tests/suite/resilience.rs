//! Retry, partial success, timeout and cancellation working as callers use
//! them around provider requests.

use futures_util::FutureExt;
use tether_core::{
    FlowError, PartialSuccessOptions, RetryPolicy, with_cancellation, with_partial_success,
    with_retry, with_timeout,
};
use tokio::time::{Instant, sleep};

use crate::common::{CallCounter, ms};

fn quick_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(3)
        .with_initial_delay(ms(10))
        .with_max_delay(ms(100))
}

#[tokio::test(start_paused = true)]
async fn retry_succeeds_after_fewer_failures_than_attempts() {
    let calls = CallCounter::default();
    let op = {
        let calls = calls.clone();
        move || {
            let n = calls.hit();
            async move {
                if n < 2 {
                    Err(format!("attempt {} failed", n + 1))
                } else {
                    Ok("synthesized")
                }
            }
        }
    };

    let start = Instant::now();
    assert_eq!(with_retry(op, &quick_retry()).await, Ok("synthesized"));
    assert_eq!(calls.get(), 3);
    // 10ms then 20ms of backoff.
    assert!(start.elapsed() >= ms(30));
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_with_last_error_unwrapped() {
    let calls = CallCounter::default();
    let op = {
        let calls = calls.clone();
        move || {
            let n = calls.hit();
            async move { Err::<(), _>(format!("attempt {} failed", n + 1)) }
        }
    };

    assert_eq!(
        with_retry(op, &quick_retry()).await,
        Err("attempt 3 failed".to_string())
    );
    assert_eq!(calls.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn partial_success_reports_each_outcome() {
    let futures = vec![
        async { Ok::<_, String>(1) }.boxed(),
        async { Err("voice unavailable".to_string()) }.boxed(),
        async {
            sleep(ms(20)).await;
            Ok(3)
        }
        .boxed(),
    ];

    let report = with_partial_success(futures, &PartialSuccessOptions::default())
        .await
        .unwrap();

    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        report.results[1],
        Err(FlowError::Operation("voice unavailable".to_string()))
    );
    assert_eq!(report.into_values(), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn partial_success_enforces_floor_after_settling() {
    let finished = CallCounter::default();
    let futures = (0..3u32).map(|i| {
        let finished = finished.clone();
        async move {
            sleep(ms(10 * u64::from(i))).await;
            finished.hit();
            if i == 1 { Err("failed") } else { Ok(i) }
        }
    });

    let options = PartialSuccessOptions::default().with_require_min_success(3);
    assert_eq!(
        with_partial_success(futures, &options).await.unwrap_err(),
        FlowError::MinSuccessNotMet {
            required: 3,
            actual: 2
        }
    );
    assert_eq!(finished.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn timeout_passes_fast_work_and_fails_slow_work() {
    let fast = with_timeout(
        async {
            sleep(ms(50)).await;
            Ok::<_, String>("fast")
        },
        ms(100),
    )
    .await;
    assert_eq!(fast, Ok("fast"));

    let slow = with_timeout(
        async {
            sleep(ms(200)).await;
            Ok::<_, String>("slow")
        },
        ms(100),
    )
    .await;
    let err = slow.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "Operation timed out");
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_flight_reports_reason() {
    let running = with_cancellation(|signal| async move {
        for _ in 0..100 {
            signal.check::<String>()?;
            sleep(ms(10)).await;
        }
        Ok::<_, FlowError<String>>("finished")
    });

    let handle = running.handle();
    tokio::spawn(async move {
        sleep(ms(50)).await;
        handle.cancel("User cancelled");
    });

    let err = running.result().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Operation cancelled: User cancelled");
}
