// Progress Reporting Port
// Single sink for update events emitted by pipelines and the resource monitor

use crate::domain::ResourceSample;
use std::time::Duration;

/// Update event emitted by a pipeline run or the resource monitor
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    RunStarted {
        pipeline: String,
        session_id: String,
        total_steps: usize,
    },
    StepStarted {
        pipeline: String,
        index: usize,
        total: usize,
        step: String,
    },
    StepFinished {
        pipeline: String,
        index: usize,
        total: usize,
        step: String,
        success: bool,
        duration: Duration,
    },
    RunFinished {
        pipeline: String,
        success: bool,
        completed: usize,
        total: usize,
        elapsed: Duration,
    },
    ResourceSampled(ResourceSample),
    ResourceAlert {
        resource: &'static str,
        message: String,
    },
}

/// Progress reporter port
///
/// Called inline from the emitting task; implementations must not block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Reporter that discards every event
pub struct NoopProgressReporter;

impl ProgressReporter for NoopProgressReporter {
    fn report(&self, _event: ProgressEvent) {}
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every event for later assertions
    #[derive(Default)]
    pub struct RecordingProgressReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingProgressReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn started_steps(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    ProgressEvent::StepStarted { step, .. } => Some(step),
                    _ => None,
                })
                .collect()
        }
    }

    impl ProgressReporter for RecordingProgressReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
