//! Bounded Fan-out Tests
//!
//! Retried operations fanned out through the concurrency gate, with the
//! live-worker gauge observed by the system sampler.

use futures::future::join_all;
use probewatch_core::application::{BoundedConcurrencyExecutor, RetryError, RetryExecutor};
use probewatch_core::domain::RetryPolicy;
use probewatch_core::error::AppError;
use probewatch_core::port::ResourceSampler;
use probewatch_infra_system::SystemResourceSampler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn policy() -> RetryPolicy {
    RetryPolicy::fixed(3, Duration::from_millis(10), Duration::from_millis(100))
}

#[tokio::test(start_paused = true)]
async fn test_retried_fanout_respects_ceiling() {
    let root = CancellationToken::new();
    let executor = BoundedConcurrencyExecutor::new(root.clone(), 3);
    let sampler = SystemResourceSampler::new(executor.gauge());
    let retry = RetryExecutor::new(policy());

    let calls = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..8).map(|i| {
        let executor = executor.clone();
        let retry = &retry;
        let root = &root;
        let calls = calls.clone();
        let peak = peak.clone();
        let sampler = &sampler;
        async move {
            executor
                .execute(&format!("target-{i}"), async {
                    let outcome = retry
                        .execute_with_retry(root, |attempt| {
                            let calls = calls.clone();
                            let peak = peak.clone();
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                peak.fetch_max(sampler.worker_count(), Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(20)).await;
                                // First attempt is throttled, the retry succeeds
                                Ok::<u16, AppError>(if attempt == 0 { 429 } else { 200 })
                            }
                        })
                        .await;
                    outcome.map_err(AppError::from)
                })
                .await
        }
    });

    let results = join_all(tasks).await;

    assert!(results.iter().all(|r| matches!(r, Ok(200))));
    assert_eq!(calls.load(Ordering::SeqCst), 16);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert_eq!(executor.in_flight(), 0);
    assert_eq!(sampler.worker_count(), 0);
    assert_eq!(executor.available_permits(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_releases_queued_work() {
    let root = CancellationToken::new();
    let executor = BoundedConcurrencyExecutor::new(root.clone(), 1);
    let started = Arc::new(AtomicUsize::new(0));

    let tasks = (0..4).map(|i| {
        let executor = executor.clone();
        let started = started.clone();
        let root = root.clone();
        async move {
            executor
                .execute(&format!("target-{i}"), async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    root.cancelled().await;
                    Err::<(), _>(AppError::Cancelled)
                })
                .await
        }
    });

    let canceller = {
        let root = root.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            root.cancel();
        }
    };

    let (results, ()) = tokio::join!(join_all(tasks), canceller);

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert!(results
        .iter()
        .all(|r| matches!(r, Err(AppError::Cancelled))));
    assert_eq!(executor.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_last_outcome() {
    let retry = RetryExecutor::new(policy());
    let ctx = CancellationToken::new();

    let err = retry
        .execute_with_retry(&ctx, |_attempt| async { Ok::<u16, AppError>(503) })
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(err.last_outcome(), Some(&503));
    assert!(matches!(err, RetryError::Exhausted { attempts: 4, .. }));
}
