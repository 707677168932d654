// Resource sampling port
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// System-wide memory reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemMemory {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl SystemMemory {
    /// Used memory as a percentage of total (0.0 - 100.0)
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Sampler port for process and host resource readings
///
/// Implementations:
/// - SystemResourceSampler (infra-system): sysinfo-backed
/// - MockResourceSampler: scripted readings for tests
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Memory held by this process, in bytes (resident set size)
    async fn app_memory(&self) -> Result<u64>;

    /// Host memory usage
    async fn system_memory(&self) -> Result<SystemMemory>;

    /// Global CPU usage (0.0 - 100.0) measured over `window`
    async fn cpu_percent(&self, window: Duration) -> Result<f64>;

    /// Live concurrent workers
    fn worker_count(&self) -> usize;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Readings {
        app_memory: u64,
        system_memory: SystemMemory,
        cpu_percent: f64,
        workers: usize,
        fail_app_memory: bool,
        fail_system_memory: bool,
        fail_cpu: bool,
    }

    /// Mock ResourceSampler with settable readings
    pub struct MockResourceSampler {
        readings: Mutex<Readings>,
        system_memory_calls: AtomicUsize,
    }

    impl MockResourceSampler {
        /// Sampler reporting the given system memory percentage and idle everything else
        pub fn with_system_memory_percent(percent: f64) -> Self {
            Self {
                readings: Mutex::new(Readings {
                    app_memory: 64 * crate::domain::MIB,
                    system_memory: SystemMemory {
                        used_bytes: (percent * 10.0) as u64,
                        total_bytes: 1000,
                    },
                    cpu_percent: 5.0,
                    workers: 1,
                    fail_app_memory: false,
                    fail_system_memory: false,
                    fail_cpu: false,
                }),
                system_memory_calls: AtomicUsize::new(0),
            }
        }

        pub fn healthy() -> Self {
            Self::with_system_memory_percent(20.0)
        }

        pub fn set_app_memory(&self, bytes: u64) {
            self.readings.lock().unwrap().app_memory = bytes;
        }

        pub fn set_system_memory_percent(&self, percent: f64) {
            self.readings.lock().unwrap().system_memory = SystemMemory {
                used_bytes: (percent * 10.0) as u64,
                total_bytes: 1000,
            };
        }

        pub fn set_cpu_percent(&self, percent: f64) {
            self.readings.lock().unwrap().cpu_percent = percent;
        }

        pub fn set_workers(&self, workers: usize) {
            self.readings.lock().unwrap().workers = workers;
        }

        pub fn fail_app_memory(&self, fail: bool) {
            self.readings.lock().unwrap().fail_app_memory = fail;
        }

        pub fn fail_system_memory(&self, fail: bool) {
            self.readings.lock().unwrap().fail_system_memory = fail;
        }

        pub fn fail_cpu(&self, fail: bool) {
            self.readings.lock().unwrap().fail_cpu = fail;
        }

        pub fn system_memory_calls(&self) -> usize {
            self.system_memory_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceSampler for MockResourceSampler {
        async fn app_memory(&self) -> Result<u64> {
            let readings = self.readings.lock().unwrap().clone();
            if readings.fail_app_memory {
                return Err(AppError::Sampler("mock rss read failed".to_string()));
            }
            Ok(readings.app_memory)
        }

        async fn system_memory(&self) -> Result<SystemMemory> {
            self.system_memory_calls.fetch_add(1, Ordering::SeqCst);
            let readings = self.readings.lock().unwrap().clone();
            if readings.fail_system_memory {
                return Err(AppError::Sampler("mock memory read failed".to_string()));
            }
            Ok(readings.system_memory)
        }

        async fn cpu_percent(&self, _window: Duration) -> Result<f64> {
            let readings = self.readings.lock().unwrap().clone();
            if readings.fail_cpu {
                return Err(AppError::Sampler("mock cpu read failed".to_string()));
            }
            Ok(readings.cpu_percent)
        }

        fn worker_count(&self) -> usize {
            self.readings.lock().unwrap().workers
        }
    }
}
