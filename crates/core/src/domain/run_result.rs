// Pipeline Run Result

use crate::error::AppError;
use std::time::Duration;

/// Outcome of a single step within a run
#[derive(Debug)]
pub struct StepOutcome {
    pub name: String,
    pub required: bool,
    /// False when the step was never invoked (aborted run or cancellation)
    pub ran: bool,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<AppError>,
}

impl StepOutcome {
    pub(crate) fn skipped(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            ran: false,
            success: false,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Aggregate result of a pipeline or workflow run
///
/// Built once per run and handed to the caller.
#[derive(Debug)]
pub struct RunResult<T = ()> {
    pub pipeline: String,
    pub session_id: String,
    /// One entry per registered step, in registration order
    pub steps: Vec<StepOutcome>,
    pub success: bool,
    /// First required step that failed, or the step a cancellation stopped at
    pub failed_at: Option<String>,
    pub elapsed: Duration,
    /// Final value of a value-chain pipeline
    pub output: Option<T>,
}

impl<T> RunResult<T> {
    /// Steps that ran and succeeded
    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.ran && s.success).count()
    }

    pub fn ran_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.ran).count()
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn was_cancelled(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.error, Some(AppError::Cancelled)))
    }
}
