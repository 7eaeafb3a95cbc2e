use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::activity::ActivityError;
use crate::core::container::RuntimeError;
use crate::core::store::StoreError;
use crate::core::workflow::{ActivityOptions, RetryPolicy, WorkflowError, execute_activity};

fn unavailable() -> ActivityError {
    ActivityError::Runtime(RuntimeError::Unavailable("daemon down".to_string()))
}

#[test]
fn backoff_grows_and_is_capped() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(1), Duration::from_secs(1));
    assert_eq!(policy.backoff(2), Duration::from_secs(2));
    assert_eq!(policy.backoff(3), Duration::from_secs(4));
    assert_eq!(policy.backoff(10), Duration::from_secs(30));
    assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
}

#[test]
fn default_options_match_worker_defaults() {
    let options = ActivityOptions::default();
    assert_eq!(options.start_to_close_timeout(), Duration::from_secs(120));
    assert_eq!(options.retry.maximum_attempts, 5);
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_fifth_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let value = execute_activity(
        "Flaky",
        &ActivityOptions::default(),
        &CancellationToken::new(),
        move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 5 {
                    Err(unavailable())
                } else {
                    Ok(attempt)
                }
            }
        },
    )
    .await
    .unwrap();
    assert_eq!(value, 5);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn sixth_attempt_is_never_made() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let err = execute_activity::<(), _, _>(
        "Flaky",
        &ActivityOptions::default(),
        &CancellationToken::new(),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::RetriesExhausted { attempts: 5, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_stops_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let err = execute_activity::<(), _, _>(
        "Broken",
        &ActivityOptions::default(),
        &CancellationToken::new(),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ActivityError::Store(StoreError::Consistency("bad".into()))) }
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::NonRetryable { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_timing_out_reports_timeout() {
    let options = ActivityOptions {
        start_to_close_timeout_secs: 1,
        retry: RetryPolicy {
            maximum_attempts: 2,
            ..RetryPolicy::default()
        },
    };
    let err = execute_activity::<(), _, _>(
        "Hanging",
        &options,
        &CancellationToken::new(),
        |_| std::future::pending(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Timeout { attempts: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_the_running_attempt() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let err = execute_activity::<(), _, _>(
        "Hanging",
        &ActivityOptions::default(),
        &cancel,
        |_| std::future::pending(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Canceled));
}
