// Progress reporter that forwards events to tracing

use crate::port::{ProgressEvent, ProgressReporter};
use tracing::{debug, info, warn};

/// Default reporter for headless runs: every event becomes a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressReporter;

impl ProgressReporter for TracingProgressReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted {
                pipeline,
                session_id,
                total_steps,
            } => {
                debug!(pipeline = %pipeline, session_id = %session_id, total_steps, "progress: run started");
            }
            ProgressEvent::StepStarted {
                pipeline,
                index,
                total,
                step,
            } => {
                info!(pipeline = %pipeline, step = %step, "progress: [{}/{}]", index + 1, total);
            }
            ProgressEvent::StepFinished {
                pipeline,
                step,
                success,
                duration,
                ..
            } => {
                debug!(
                    pipeline = %pipeline,
                    step = %step,
                    success,
                    duration_ms = duration.as_millis() as u64,
                    "progress: step finished"
                );
            }
            ProgressEvent::RunFinished {
                pipeline,
                success,
                completed,
                total,
                elapsed,
            } => {
                info!(
                    pipeline = %pipeline,
                    success,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "progress: {}/{} steps completed",
                    completed,
                    total
                );
            }
            ProgressEvent::ResourceSampled(sample) => {
                debug!(
                    app_memory_bytes = sample.app_memory_bytes,
                    system_memory_percent = sample.system_memory_percent,
                    cpu_percent = sample.cpu_percent,
                    workers = sample.worker_count,
                    "progress: resource sample"
                );
            }
            ProgressEvent::ResourceAlert { resource, message } => {
                warn!(resource, "progress: {}", message);
            }
        }
    }
}
