// Value-chain pipeline - each step transforms the previous step's output

use super::step::PipelineStep;
use super::{run_guarded, Flow, RunTracker};
use crate::domain::RunResult;
use crate::port::{NoopProgressReporter, ProgressReporter};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Ordered chain of `T -> T` steps
///
/// A failed step leaves the value untouched, so an optional step that fails
/// passes its input through to the next one.
pub struct Pipeline<T> {
    name: String,
    session_id: String,
    stop_on_error: bool,
    steps: Vec<PipelineStep<T>>,
    progress: Arc<dyn ProgressReporter>,
}

impl<T> Pipeline<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>, session_id: impl Into<String>, stop_on_error: bool) -> Self {
        Self {
            name: name.into(),
            session_id: session_id.into(),
            stop_on_error,
            steps: Vec::new(),
            progress: Arc::new(NoopProgressReporter),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn add_step(&mut self, step: PipelineStep<T>) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Builder-style variant of `add_step`
    pub fn step(mut self, step: PipelineStep<T>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Thread `input` through every step under `ctx`
    ///
    /// `output` holds the last successfully produced value, even for failed runs.
    pub async fn execute(&self, ctx: &CancellationToken, input: T) -> RunResult<T> {
        let mut tracker = RunTracker::begin(
            &self.name,
            &self.session_id,
            self.stop_on_error,
            self.progress.as_ref(),
            self.steps.iter().map(|s| &s.info).collect(),
        );

        let mut value = input;
        for (index, step) in self.steps.iter().enumerate() {
            if tracker.check_cancelled(ctx, index) == Flow::Abort {
                break;
            }
            tracker.step_started(index);

            let step_ctx = ctx.child_token();
            let started = Instant::now();
            let result = run_guarded(
                ctx,
                &step_ctx,
                step.info.timeout,
                step.action.run(step_ctx.clone(), value.clone()),
            )
            .await;

            let result = match result {
                Ok(next) => {
                    value = next;
                    Ok(())
                }
                Err(e) => Err(e),
            };

            if tracker.record(ctx, index, result, started.elapsed()) == Flow::Abort {
                break;
            }
        }

        tracker.finish(Some(value))
    }
}
