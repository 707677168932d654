// Central Error Type for the Orchestration Core

use std::time::Duration;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// The governing cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// A step- or wait-scoped deadline elapsed
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Service already running: {0}")]
    AlreadyRunning(String),

    #[error("Service not running: {0}")]
    NotRunning(String),

    #[error("Resource limit exceeded: {resource} at {current}, limit {limit}")]
    ResourceLimit {
        resource: &'static str,
        current: u64,
        limit: u64,
    },

    #[error("Sampler error: {0}")]
    Sampler(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for cancellation and timeouts, which must never be retried or
    /// masked by continuation logic.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::Cancelled | AppError::Timeout(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
