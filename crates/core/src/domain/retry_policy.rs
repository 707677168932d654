// Retry Policy Domain Model

use super::error::{DomainError, Result};
use std::collections::HashSet;
use std::time::Duration;

/// Outcome codes treated as transient by default (timeouts, throttling, 5xx gateway errors)
pub const DEFAULT_RETRYABLE_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Immutable retry policy
///
/// `max_attempts` counts retries after the initial try, so an operation is
/// invoked at most `max_attempts + 1` times.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    pub retryable_codes: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
            retryable_codes: DEFAULT_RETRYABLE_CODES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy without jitter, for deterministic backoff
    pub fn fixed(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: false,
            ..Default::default()
        }
    }

    /// Replace the retryable code set
    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, code: u16) -> bool {
        self.retryable_codes.contains(&code)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay > self.max_delay {
            return Err(DomainError::InvalidRetryPolicy(format!(
                "base delay {:?} exceeds max delay {:?}",
                self.base_delay, self.max_delay
            )));
        }
        Ok(())
    }
}
