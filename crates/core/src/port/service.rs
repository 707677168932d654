// Service Lifecycle Port
// Owner-supplied start/stop/health routines wrapped by ServiceHandle

use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Lifecycle routines of an independently running subsystem
///
/// Every routine is optional: the defaults succeed without doing anything.
#[async_trait]
pub trait ServiceLifecycle: Send + Sync {
    /// Start the service. Should return once the service is up, spawning any
    /// long-running work that observes `ctx`.
    async fn start(&self, _ctx: CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Stop the service and release its resources
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Health probe, only consulted while the service is running
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock service with scripted failures and call counters
    #[derive(Default)]
    pub struct MockService {
        pub fail_start: AtomicBool,
        pub fail_stop: AtomicBool,
        pub unhealthy: AtomicBool,
        /// Artificial latency inside `stop`, in milliseconds
        pub stop_delay_ms: AtomicUsize,
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
    }

    impl MockService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_stop() -> Self {
            let service = Self::default();
            service.fail_stop.store(true, Ordering::SeqCst);
            service
        }

        pub fn start_calls(&self) -> usize {
            self.start_calls.load(Ordering::SeqCst)
        }

        pub fn stop_calls(&self) -> usize {
            self.stop_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ServiceLifecycle for MockService {
        async fn start(&self, _ctx: CancellationToken) -> Result<()> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(AppError::Execution("mock start failed".to_string()));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.stop_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(AppError::Execution("mock stop failed".to_string()));
            }
            Ok(())
        }

        async fn health(&self) -> Result<()> {
            if self.unhealthy.load(Ordering::SeqCst) {
                return Err(AppError::Execution("mock unhealthy".to_string()));
            }
            Ok(())
        }
    }
}
