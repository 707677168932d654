// Application Layer - Orchestration primitives

pub mod concurrency;
pub mod constants;
pub mod monitor;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod shutdown;

// Re-exports
pub use concurrency::{BoundedConcurrencyExecutor, InFlightGauge};
pub use monitor::{ResourceMonitor, TickReport};
pub use pipeline::{Pipeline, PipelineStep, ResultStore, StepContext, WorkflowExecutor, WorkflowStep};
pub use progress::TracingProgressReporter;
pub use retry::{LastAttempt, OutcomeCode, RetryError, RetryExecutor};
pub use shutdown::{GracefulShutdown, ServiceHandle, ShutdownManager, WaitReport};
