// Workflow executor - independent steps sharing a typed result store

use super::step::{ResultStore, StepContext, WorkflowStep};
use super::{run_guarded, Flow, RunTracker};
use crate::domain::RunResult;
use crate::port::{NoopProgressReporter, ProgressReporter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs named, side-effecting steps in registration order
///
/// The run's output is a snapshot of the result store.
pub struct WorkflowExecutor<V> {
    name: String,
    session_id: Arc<str>,
    stop_on_error: bool,
    steps: Vec<WorkflowStep<V>>,
    results: ResultStore<V>,
    progress: Arc<dyn ProgressReporter>,
}

impl<V> WorkflowExecutor<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new workflow
    ///
    /// # Arguments
    /// * `name` - Workflow name used in logs and results
    /// * `session_id` - Identifier of the scan session
    /// * `stop_on_error` - Abort on the first required failure
    pub fn new(name: impl Into<String>, session_id: impl Into<String>, stop_on_error: bool) -> Self {
        Self {
            name: name.into(),
            session_id: Arc::from(session_id.into()),
            stop_on_error,
            steps: Vec::new(),
            results: ResultStore::new(),
            progress: Arc::new(NoopProgressReporter),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Append a step; execution order equals insertion order
    pub fn add_step(&mut self, step: WorkflowStep<V>) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Store the steps read from and write to
    pub fn results(&self) -> ResultStore<V> {
        self.results.clone()
    }

    /// Execute every step in order under `ctx`
    ///
    /// Step failures never escape: they are recorded in the returned result.
    pub async fn execute(&self, ctx: &CancellationToken) -> RunResult<HashMap<String, V>> {
        let mut tracker = RunTracker::begin(
            &self.name,
            &self.session_id,
            self.stop_on_error,
            self.progress.as_ref(),
            self.steps.iter().map(|s| &s.info).collect(),
        );

        for (index, step) in self.steps.iter().enumerate() {
            if tracker.check_cancelled(ctx, index) == Flow::Abort {
                break;
            }
            tracker.step_started(index);

            let step_ctx = ctx.child_token();
            let context = StepContext {
                ctx: step_ctx.clone(),
                session_id: Arc::clone(&self.session_id),
                step: Arc::from(step.info.name.as_str()),
                results: self.results.clone(),
            };

            let started = Instant::now();
            let result =
                run_guarded(ctx, &step_ctx, step.info.timeout, step.action.run(context)).await;

            if tracker.record(ctx, index, result, started.elapsed()) == Flow::Abort {
                break;
            }
        }

        tracker.finish(Some(self.results.snapshot()))
    }
}
