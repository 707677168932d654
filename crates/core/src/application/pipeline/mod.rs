//! Phase pipeline - ordered steps with required/optional and stop-on-error semantics
//!
//! Two executors share the same run semantics:
//! - `WorkflowExecutor<V>`: independent steps exchanging data through a typed `ResultStore<V>`
//! - `Pipeline<T>`: a value chain where each step consumes the previous step's output
//!
//! Execution is sequential on the caller's task. Steps that need parallelism
//! fan out through `BoundedConcurrencyExecutor` themselves.

mod chain;
mod step;
mod workflow;

pub use chain::Pipeline;
pub use step::{
    PipelineStep, ResultStore, StageAction, StepAction, StepContext, StepInfo, WorkflowStep,
};
pub use workflow::WorkflowExecutor;

use crate::domain::{RunResult, StepOutcome};
use crate::error::{AppError, Result};
use crate::port::{ProgressEvent, ProgressReporter};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Whether the run keeps going after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Abort,
}

/// Run `step` under a step-scoped token, its optional timeout, and parent cancellation
pub(crate) async fn run_guarded<T, Fut>(
    ctx: &CancellationToken,
    step_ctx: &CancellationToken,
    timeout: Option<Duration>,
    step: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let bounded = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, step).await {
                Ok(res) => res,
                Err(_) => Err(AppError::Timeout(limit)),
            },
            None => step.await,
        }
    };

    // Parent cancellation wins over a step that resolves in the same poll
    let res = tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(AppError::Cancelled),
        res = bounded => res,
    };

    // Anything the step spawned under its token stops with it
    step_ctx.cancel();
    if ctx.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    res
}

/// Accumulates step outcomes and applies the required/stop-on-error policy
pub(crate) struct RunTracker<'a> {
    pipeline: &'a str,
    session_id: &'a str,
    stop_on_error: bool,
    progress: &'a dyn ProgressReporter,
    steps: Vec<&'a StepInfo>,
    outcomes: Vec<StepOutcome>,
    success: bool,
    failed_at: Option<String>,
    started: Instant,
}

impl<'a> RunTracker<'a> {
    pub(crate) fn begin(
        pipeline: &'a str,
        session_id: &'a str,
        stop_on_error: bool,
        progress: &'a dyn ProgressReporter,
        steps: Vec<&'a StepInfo>,
    ) -> Self {
        info!(
            pipeline = pipeline,
            session_id = session_id,
            steps = steps.len(),
            stop_on_error = stop_on_error,
            "Run started"
        );
        progress.report(ProgressEvent::RunStarted {
            pipeline: pipeline.to_string(),
            session_id: session_id.to_string(),
            total_steps: steps.len(),
        });

        Self {
            pipeline,
            session_id,
            stop_on_error,
            progress,
            outcomes: Vec::with_capacity(steps.len()),
            steps,
            success: true,
            failed_at: None,
            started: Instant::now(),
        }
    }

    fn mark_failed(&mut self, step: &str) {
        self.success = false;
        if self.failed_at.is_none() {
            self.failed_at = Some(step.to_string());
        }
    }

    /// Cancellation check before step `index`; records the stop point
    pub(crate) fn check_cancelled(&mut self, ctx: &CancellationToken, index: usize) -> Flow {
        if !ctx.is_cancelled() {
            return Flow::Continue;
        }

        let info = self.steps[index];
        warn!(
            pipeline = self.pipeline,
            step = %info.name,
            "Run cancelled before step"
        );
        let mut outcome = StepOutcome::skipped(&info.name, info.required);
        outcome.error = Some(AppError::Cancelled);
        self.outcomes.push(outcome);
        self.mark_failed(&info.name);
        Flow::Abort
    }

    pub(crate) fn step_started(&self, index: usize) {
        let info = self.steps[index];
        info!(
            pipeline = self.pipeline,
            step = %info.name,
            index = index + 1,
            total = self.steps.len(),
            required = info.required,
            "Step started"
        );
        self.progress.report(ProgressEvent::StepStarted {
            pipeline: self.pipeline.to_string(),
            index,
            total: self.steps.len(),
            step: info.name.clone(),
        });
    }

    /// Record step `index` and decide whether the run continues
    pub(crate) fn record(
        &mut self,
        ctx: &CancellationToken,
        index: usize,
        result: Result<()>,
        duration: Duration,
    ) -> Flow {
        let info = self.steps[index];
        let success = result.is_ok();

        self.progress.report(ProgressEvent::StepFinished {
            pipeline: self.pipeline.to_string(),
            index,
            total: self.steps.len(),
            step: info.name.clone(),
            success,
            duration,
        });

        let error = match result {
            Ok(()) => {
                info!(
                    pipeline = self.pipeline,
                    step = %info.name,
                    duration_ms = duration.as_millis() as u64,
                    "Step completed"
                );
                None
            }
            Err(e) => Some(e),
        };

        let flow = match &error {
            None => Flow::Continue,
            // Cancellation overrides the required/optional policy
            Some(e) if ctx.is_cancelled() => {
                warn!(pipeline = self.pipeline, step = %info.name, error = %e, "Step interrupted by cancellation");
                self.mark_failed(&info.name);
                Flow::Abort
            }
            Some(e) if info.required => {
                error!(
                    pipeline = self.pipeline,
                    step = %info.name,
                    error = %e,
                    duration_ms = duration.as_millis() as u64,
                    stop_on_error = self.stop_on_error,
                    "Required step failed"
                );
                self.mark_failed(&info.name);
                if self.stop_on_error {
                    Flow::Abort
                } else {
                    Flow::Continue
                }
            }
            Some(e) => {
                warn!(
                    pipeline = self.pipeline,
                    step = %info.name,
                    error = %e,
                    "Optional step failed, continuing"
                );
                Flow::Continue
            }
        };

        self.outcomes.push(StepOutcome {
            name: info.name.clone(),
            required: info.required,
            ran: true,
            success,
            duration,
            error,
        });
        flow
    }

    /// Close the run; steps never reached are recorded as not run
    pub(crate) fn finish<T>(mut self, output: Option<T>) -> RunResult<T> {
        for info in &self.steps[self.outcomes.len()..] {
            self.outcomes
                .push(StepOutcome::skipped(&info.name, info.required));
        }

        let elapsed = self.started.elapsed();
        let result = RunResult {
            pipeline: self.pipeline.to_string(),
            session_id: self.session_id.to_string(),
            steps: self.outcomes,
            success: self.success,
            failed_at: self.failed_at,
            elapsed,
            output,
        };

        info!(
            pipeline = self.pipeline,
            session_id = self.session_id,
            success = result.success,
            completed = result.completed_steps(),
            total = result.steps.len(),
            failed_at = result.failed_at.as_deref(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Run finished"
        );
        self.progress.report(ProgressEvent::RunFinished {
            pipeline: result.pipeline.clone(),
            success: result.success,
            completed: result.completed_steps(),
            total: result.steps.len(),
            elapsed,
        });
        result
    }
}
