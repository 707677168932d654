// Runner configuration (CLI flags with PROBEWATCH_* env fallbacks)

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use probewatch_core::application::constants::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STEP_TIMEOUT,
};
use probewatch_core::domain::{ResourceThresholds, RetryPolicy, MIB};

#[derive(Parser, Debug, Clone)]
#[command(name = "probewatch")]
#[command(about = "Resource-bounded HTTP probe runner", long_about = None)]
#[command(version)]
pub struct Args {
    /// Target URLs to probe
    #[arg(required = true, env = "PROBEWATCH_TARGETS", value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Maximum concurrent probes
    #[arg(short = 'c', long, env = "PROBEWATCH_CONCURRENCY", default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub concurrency: usize,

    /// Retries after the first attempt
    #[arg(long, env = "PROBEWATCH_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    #[arg(long, env = "PROBEWATCH_RETRY_BASE_MS", default_value_t = 1000)]
    pub retry_base_ms: u64,

    /// Backoff ceiling in milliseconds
    #[arg(long, env = "PROBEWATCH_RETRY_MAX_MS", default_value_t = 30_000)]
    pub retry_max_ms: u64,

    /// Disable backoff jitter
    #[arg(long)]
    pub no_jitter: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "PROBEWATCH_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Per-step timeout in seconds
    #[arg(long, env = "PROBEWATCH_STEP_TIMEOUT_SECS", default_value_t = DEFAULT_STEP_TIMEOUT.as_secs())]
    pub step_timeout_secs: u64,

    /// Keep running steps after a required step fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// App memory ceiling in MiB
    #[arg(long, env = "PROBEWATCH_MAX_APP_MEMORY_MB", default_value_t = 2048)]
    pub max_app_memory_mb: u64,

    /// Live worker ceiling
    #[arg(long, env = "PROBEWATCH_MAX_WORKERS", default_value_t = 10_000)]
    pub max_workers: usize,

    /// Used system memory fraction that aborts the run
    #[arg(long, env = "PROBEWATCH_SYSTEM_MEMORY_SHUTDOWN", default_value_t = 0.9)]
    pub system_memory_shutdown: f64,

    /// CPU fraction that aborts the run
    #[arg(long, env = "PROBEWATCH_CPU_SHUTDOWN", default_value_t = 0.95)]
    pub cpu_shutdown: f64,

    /// Resource sampling interval in seconds
    #[arg(long, env = "PROBEWATCH_SAMPLE_INTERVAL_SECS", default_value_t = 5)]
    pub sample_interval_secs: u64,

    /// Only log when shutdown thresholds are crossed
    #[arg(long)]
    pub no_auto_shutdown: bool,

    /// Seconds services get to acknowledge shutdown
    #[arg(long, env = "PROBEWATCH_SHUTDOWN_GRACE_SECS", default_value_t = DEFAULT_SHUTDOWN_GRACE.as_secs())]
    pub shutdown_grace_secs: u64,
}

impl Args {
    pub fn thresholds(&self) -> Result<ResourceThresholds> {
        let thresholds = ResourceThresholds {
            max_app_memory_bytes: self.max_app_memory_mb * MIB,
            max_workers: self.max_workers,
            system_memory_shutdown_fraction: self.system_memory_shutdown,
            cpu_shutdown_fraction: self.cpu_shutdown,
            sample_interval: Duration::from_secs(self.sample_interval_secs),
            auto_shutdown: !self.no_auto_shutdown,
            ..Default::default()
        };
        thresholds
            .validate()
            .context("Invalid resource thresholds")?;
        Ok(thresholds)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let mut policy = RetryPolicy::fixed(
            self.max_retries,
            Duration::from_millis(self.retry_base_ms),
            Duration::from_millis(self.retry_max_ms),
        );
        policy.jitter = !self.no_jitter;
        policy.validate().context("Invalid retry policy")?;
        Ok(policy)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["probewatch", "https://example.com"]).unwrap();

        assert_eq!(args.targets, vec!["https://example.com"]);
        assert_eq!(args.concurrency, DEFAULT_MAX_CONCURRENCY);

        let thresholds = args.thresholds().unwrap();
        assert_eq!(thresholds.max_app_memory_bytes, 2048 * MIB);
        assert!(thresholds.auto_shutdown);

        let policy = args.retry_policy().unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.jitter);
        assert!(policy.is_retryable(429));
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "probewatch",
            "https://a.test",
            "https://b.test",
            "--concurrency",
            "4",
            "--no-jitter",
            "--no-auto-shutdown",
            "--sample-interval-secs",
            "1",
        ])
        .unwrap();

        assert_eq!(args.targets.len(), 2);
        assert_eq!(args.concurrency, 4);
        assert!(!args.retry_policy().unwrap().jitter);

        let thresholds = args.thresholds().unwrap();
        assert!(!thresholds.auto_shutdown);
        assert_eq!(thresholds.sample_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let args = Args::try_parse_from([
            "probewatch",
            "https://a.test",
            "--cpu-shutdown",
            "1.5",
            "--retry-base-ms",
            "5000",
            "--retry-max-ms",
            "100",
        ])
        .unwrap();

        assert!(args.thresholds().is_err());
        assert!(args.retry_policy().is_err());
    }

    #[test]
    fn test_targets_required() {
        assert!(Args::try_parse_from(["probewatch"]).is_err());
    }
}
