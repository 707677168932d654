// Domain Layer - Immutable configuration and result models

pub mod error;
pub mod resource;
pub mod retry_policy;
pub mod run_result;

// Re-exports
pub use error::DomainError;
pub use resource::{ResourceSample, ResourceThresholds, MIB};
pub use retry_policy::{RetryPolicy, DEFAULT_RETRYABLE_CODES};
pub use run_result::{RunResult, StepOutcome};
