// HTTP prober: HEAD requests through the retry and concurrency executors

use anyhow::{Context, Result};
use futures::future::join_all;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use probewatch_core::application::{
    BoundedConcurrencyExecutor, LastAttempt, OutcomeCode, RetryError, RetryExecutor,
};
use probewatch_core::error::AppError;

/// Status observed for one request
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    pub status: u16,
}

impl OutcomeCode for HttpOutcome {
    fn outcome_code(&self) -> u16 {
        self.status
    }
}

/// Final verdict for one target
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub url: String,
    /// Last status seen, if the target answered at all
    pub status: Option<u16>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ProbeReport {
    /// Answered with a non-retryable status
    pub fn is_ok(&self) -> bool {
        self.status.is_some() && self.error.is_none()
    }

    pub fn responded(&self) -> bool {
        self.status.is_some()
    }
}

pub struct HttpProber {
    client: reqwest::Client,
    retry: RetryExecutor,
    executor: BoundedConcurrencyExecutor,
}

impl HttpProber {
    pub fn new(
        request_timeout: Duration,
        retry: RetryExecutor,
        executor: BoundedConcurrencyExecutor,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("probewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            retry,
            executor,
        })
    }

    /// Probe every target; at most `max_concurrency` requests are in flight
    pub async fn probe_all(&self, ctx: &CancellationToken, targets: &[String]) -> Vec<ProbeReport> {
        info!(
            targets = targets.len(),
            max_concurrency = self.executor.max_concurrency(),
            "Probing targets"
        );

        join_all(targets.iter().map(|url| self.probe_one(ctx, url))).await
    }

    async fn probe_one(&self, ctx: &CancellationToken, url: &str) -> ProbeReport {
        let started = Instant::now();
        let gated = self
            .executor
            .execute(url, async {
                Ok::<_, AppError>(
                    self.retry
                        .execute_with_retry(ctx, |attempt| self.head(url, attempt))
                        .await,
                )
            })
            .await;

        let report = match gated {
            Ok(retried) => to_report(url, retried, started.elapsed()),
            Err(e) => ProbeReport {
                url: url.to_string(),
                status: None,
                error: Some(e.to_string()),
                elapsed: started.elapsed(),
            },
        };

        match &report.error {
            None => debug!(url = %url, status = ?report.status, "Probe finished"),
            Some(e) => warn!(url = %url, status = ?report.status, error = %e, "Probe failed"),
        }
        report
    }

    async fn head(&self, url: &str, attempt: u32) -> probewatch_core::Result<HttpOutcome> {
        debug!(url = %url, attempt = attempt, "HEAD");
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| AppError::Execution(format!("request to {url} failed: {e}")))?;

        Ok(HttpOutcome {
            status: response.status().as_u16(),
        })
    }
}

fn to_report(
    url: &str,
    retried: std::result::Result<HttpOutcome, RetryError<HttpOutcome>>,
    elapsed: Duration,
) -> ProbeReport {
    let (status, error) = match retried {
        Ok(outcome) => (Some(outcome.status), None),
        Err(e @ (RetryError::Cancelled | RetryError::Interrupted(_))) => (None, Some(e.to_string())),
        Err(RetryError::Exhausted { attempts, last }) => match last {
            LastAttempt::Outcome(outcome) => (
                Some(outcome.status),
                Some(format!(
                    "still {} after {} attempts",
                    outcome.status, attempts
                )),
            ),
            LastAttempt::Failure(err) => (None, Some(err.to_string())),
        },
    };

    ProbeReport {
        url: url.to_string(),
        status,
        error,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_outcome_keeps_last_status() {
        let report = to_report(
            "https://a.test",
            Err(RetryError::Exhausted {
                attempts: 4,
                last: LastAttempt::Outcome(HttpOutcome { status: 503 }),
            }),
            Duration::ZERO,
        );

        assert_eq!(report.status, Some(503));
        assert!(report.responded());
        assert!(!report.is_ok());
        assert!(report.error.unwrap().contains("4 attempts"));
    }

    #[test]
    fn test_transport_failure_has_no_status() {
        let report = to_report(
            "https://a.test",
            Err(RetryError::Exhausted {
                attempts: 1,
                last: LastAttempt::Failure(AppError::Execution("connection refused".into())),
            }),
            Duration::ZERO,
        );

        assert!(!report.responded());
        assert!(report.error.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_non_retryable_status_is_ok() {
        let report = to_report("https://a.test", Ok(HttpOutcome { status: 404 }), Duration::ZERO);

        assert!(report.is_ok());
        assert_eq!(report.status, Some(404));
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_requests() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let prober = HttpProber::new(
            Duration::from_secs(1),
            RetryExecutor::new(Default::default()),
            BoundedConcurrencyExecutor::new(ctx.clone(), 2),
        )
        .unwrap();

        let reports = prober
            .probe_all(&ctx, &["http://127.0.0.1:9".to_string()])
            .await;

        assert_eq!(reports.len(), 1);
        assert!(!reports[0].responded());
        assert!(reports[0].error.is_some());
    }
}
