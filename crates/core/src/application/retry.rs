// Retry executor with exponential backoff
use crate::application::constants::JITTER_FRACTION_DIVISOR;
use crate::domain::RetryPolicy;
use crate::error::AppError;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Anything that carries a numeric outcome code (HTTP status, exit code, ...)
pub trait OutcomeCode {
    fn outcome_code(&self) -> u16;
}

impl OutcomeCode for u16 {
    fn outcome_code(&self) -> u16 {
        *self
    }
}

/// Last thing observed before the retry budget ran out
#[derive(Debug)]
pub enum LastAttempt<T> {
    /// A response carrying a retryable outcome code
    Outcome(T),
    /// A transport-level failure (no outcome code obtained)
    Failure(AppError),
}

/// Retry failure
#[derive(Debug)]
pub enum RetryError<T> {
    /// The governing token fired before or between attempts
    Cancelled,
    /// An attempt ended with a cancellation-class error such as a timeout
    Interrupted(AppError),
    /// Every attempt was used up
    Exhausted { attempts: u32, last: LastAttempt<T> },
}

impl<T> RetryError<T> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Last response observed, if the final attempt produced one
    pub fn last_outcome(&self) -> Option<&T> {
        match self {
            RetryError::Exhausted {
                last: LastAttempt::Outcome(outcome),
                ..
            } => Some(outcome),
            _ => None,
        }
    }
}

impl<T: OutcomeCode> fmt::Display for RetryError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "Operation cancelled"),
            RetryError::Interrupted(err) => write!(f, "attempt interrupted: {}", err),
            RetryError::Exhausted {
                attempts,
                last: LastAttempt::Outcome(outcome),
            } => write!(
                f,
                "retries exhausted after {} attempts: last outcome {}",
                attempts,
                outcome.outcome_code()
            ),
            RetryError::Exhausted {
                attempts,
                last: LastAttempt::Failure(err),
            } => write!(
                f,
                "retries exhausted after {} attempts: last error {}",
                attempts, err
            ),
        }
    }
}

impl<T: OutcomeCode + fmt::Debug> std::error::Error for RetryError<T> {}

impl<T: OutcomeCode> From<RetryError<T>> for AppError {
    fn from(err: RetryError<T>) -> Self {
        match err {
            RetryError::Cancelled => AppError::Cancelled,
            RetryError::Interrupted(err) => err,
            exhausted => AppError::Execution(exhausted.to_string()),
        }
    }
}

/// Executes fallible network-shaped operations with bounded, backed-off retries
///
/// Holds only the immutable policy, so one instance can be shared across
/// concurrent operations.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// False once `attempt >= max_attempts`, otherwise whether `code` is retryable
    pub fn should_retry(&self, code: u16, attempt: u32) -> bool {
        if attempt >= self.policy.max_attempts {
            return false;
        }
        self.policy.is_retryable(code)
    }

    /// Backoff before the retry that follows `attempt`
    ///
    /// delay = base * 2^attempt, capped at max_delay; jitter adds up to 10%
    /// of the capped delay and never pushes past the cap.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.base_delay;
        let max = self.policy.max_delay;

        let delay = if attempt == 0 {
            base
        } else {
            let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
            base.saturating_mul(factor)
        }
        .min(max);

        if !self.policy.jitter {
            return delay;
        }

        let jitter_cap_ms = (delay / JITTER_FRACTION_DIVISOR).as_millis() as u64;
        if jitter_cap_ms == 0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_cap_ms);
        (delay + Duration::from_millis(extra)).min(max)
    }

    /// Run `operation` until it yields a non-retryable outcome or the budget runs out
    ///
    /// `operation` receives the zero-based attempt index. An `Err` is a
    /// transport failure and is retried immediately; an `Ok` whose code is
    /// retryable is retried after `compute_delay(attempt)`. Cancellation-class
    /// errors (`Cancelled`, `Timeout`) are never retried.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<T>>
    where
        T: OutcomeCode,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            match operation(attempt).await {
                Err(AppError::Cancelled) => return Err(RetryError::Cancelled),
                Err(err) if err.is_cancellation() => {
                    debug!(attempt = attempt, error = %err, "Attempt interrupted, not retrying");
                    return Err(RetryError::Interrupted(err));
                }
                Err(err) => {
                    if attempt >= max_attempts {
                        warn!(
                            attempt = attempt,
                            error = %err,
                            "Transport failure, retries exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            last: LastAttempt::Failure(err),
                        });
                    }
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %err,
                        "Transport failure, retrying immediately"
                    );
                }
                Ok(outcome) => {
                    let code = outcome.outcome_code();
                    if !self.policy.is_retryable(code) {
                        debug!(attempt = attempt, code = code, "Attempt finished");
                        return Ok(outcome);
                    }
                    if !self.should_retry(code, attempt) {
                        warn!(
                            attempt = attempt,
                            code = code,
                            "Retryable outcome, retries exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            last: LastAttempt::Outcome(outcome),
                        });
                    }

                    let delay = self.compute_delay(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        code = code,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable outcome, backing off"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {},
                        _ = ctx.cancelled() => return Err(RetryError::Cancelled),
                    }
                }
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::fixed(
            max_attempts,
            Duration::from_secs(1),
            Duration::from_secs(10),
        ))
    }

    /// Replays scripted outcomes and records when each attempt started
    fn scripted(
        codes: Vec<u16>,
        calls: Arc<Mutex<Vec<Instant>>>,
    ) -> impl FnMut(u32) -> futures::future::Ready<crate::Result<u16>> {
        let mut queue: VecDeque<u16> = codes.into();
        move |_attempt| {
            calls.lock().unwrap().push(Instant::now());
            futures::future::ready(Ok(queue.pop_front().unwrap_or(200)))
        }
    }

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_should_retry_false_at_or_beyond_max() {
        let exec = executor(3);
        assert!(exec.should_retry(429, 0));
        assert!(exec.should_retry(429, 2));
        assert!(!exec.should_retry(429, 3));
        assert!(!exec.should_retry(429, 100));
        assert!(!exec.should_retry(404, 0));
    }

    #[test]
    fn test_compute_delay_doubles_and_caps() {
        let exec = executor(10);
        assert_eq!(exec.compute_delay(0), Duration::from_secs(1));
        assert_eq!(exec.compute_delay(1), Duration::from_secs(2));
        assert_eq!(exec.compute_delay(2), Duration::from_secs(4));
        assert_eq!(exec.compute_delay(3), Duration::from_secs(8));
        assert_eq!(exec.compute_delay(4), Duration::from_secs(10));
        assert_eq!(exec.compute_delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_compute_delay_non_decreasing_and_bounded() {
        let exec = executor(64);
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = exec.compute_delay(attempt);
            assert!(delay >= previous, "delay decreased at attempt {}", attempt);
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_ten_percent_and_cap() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::fixed(10, Duration::from_secs(1), Duration::from_secs(10))
        };
        let exec = RetryExecutor::new(policy);

        for _ in 0..50 {
            let first = exec.compute_delay(1);
            assert!(first >= Duration::from_secs(2));
            assert!(first <= Duration::from_millis(2200));

            let capped = exec.compute_delay(8);
            assert_eq!(capped, Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_backoffs_then_success() {
        let exec = executor(3);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ctx = CancellationToken::new();

        let result = exec
            .execute_with_retry(&ctx, scripted(vec![429, 429, 200], calls.clone()))
            .await;

        assert_eq!(result.unwrap(), 200);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_close(calls[1] - calls[0], Duration::from_secs(1));
        assert_close(calls[2] - calls[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_retryable_exhausts_budget() {
        let exec = executor(3);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ctx = CancellationToken::new();

        let err = exec
            .execute_with_retry(&ctx, scripted(vec![429, 429, 429, 429], calls.clone()))
            .await
            .unwrap_err();

        // max_attempts counts retries: initial try + 3 retries
        assert_eq!(calls.lock().unwrap().len(), 4);
        assert!(err.is_exhausted());
        assert_eq!(err.last_outcome(), Some(&429));
        assert!(err.to_string().contains("retries exhausted"));
        match err {
            RetryError::Exhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let exec = executor(3);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ctx = CancellationToken::new();

        let result = exec
            .execute_with_retry(&ctx, scripted(vec![404, 200], calls.clone()))
            .await;

        assert_eq!(result.unwrap(), 404);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_retries_without_delay() {
        let exec = executor(2);
        let ctx = CancellationToken::new();
        let start = Instant::now();
        let mut failures = 2;

        let result = exec
            .execute_with_retry(&ctx, |_| {
                let outcome = if failures > 0 {
                    failures -= 1;
                    Err(AppError::Execution("connection reset".to_string()))
                } else {
                    Ok(200u16)
                };
                futures::future::ready(outcome)
            })
            .await;

        assert_eq!(result.unwrap(), 200);
        assert_eq!(Instant::now() - start, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_transport_failures_exhaust_with_last_error() {
        let exec = executor(1);
        let ctx = CancellationToken::new();

        let err = exec
            .execute_with_retry(&ctx, |attempt| {
                futures::future::ready(Err::<u16, _>(AppError::Execution(format!(
                    "dns failure {}",
                    attempt
                ))))
            })
            .await
            .unwrap_err();

        match err {
            RetryError::Exhausted {
                attempts,
                last: LastAttempt::Failure(e),
            } => {
                assert_eq!(attempts, 2);
                assert!(e.to_string().contains("dns failure 1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let exec = executor(3);
        let ctx = CancellationToken::new();
        ctx.cancel();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let err = exec
            .execute_with_retry(&ctx, scripted(vec![200], calls.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let exec = RetryExecutor::new(RetryPolicy::fixed(
            3,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = exec
            .execute_with_retry(&ctx, |_| futures::future::ready(Ok(503u16)))
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled));
        assert!(Instant::now() - start < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_cancelled_error_from_operation_not_retried() {
        let exec = executor(3);
        let ctx = CancellationToken::new();
        let mut calls = 0;

        let err = exec
            .execute_with_retry(&ctx, |_| {
                calls += 1;
                futures::future::ready(Err::<u16, _>(AppError::Cancelled))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled));
        assert_eq!(calls, 1);
        assert!(matches!(AppError::from(err), AppError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_from_operation_not_retried() {
        let exec = executor(3);
        let ctx = CancellationToken::new();
        let start = Instant::now();
        let mut calls = 0;

        let err = exec
            .execute_with_retry(&ctx, |_| {
                calls += 1;
                futures::future::ready(Err::<u16, _>(AppError::Timeout(Duration::from_secs(5))))
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert_eq!(Instant::now() - start, Duration::ZERO);
        assert!(!err.is_exhausted());
        assert!(matches!(err, RetryError::Interrupted(AppError::Timeout(_))));
        assert!(AppError::from(err).is_cancellation());
    }
}
