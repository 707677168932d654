// Resource sampler implementation
// reason: sysinfo for cross-platform process and host readings
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use sysinfo::{Pid, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

use probewatch_core::application::InFlightGauge;
use probewatch_core::error::{AppError, Result};
use probewatch_core::port::{ResourceSampler, SystemMemory};

/// Resource sampler backed by sysinfo
///
/// Worker count comes from the gauge shared with the concurrency executor.
pub struct SystemResourceSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
    workers: InFlightGauge,
}

impl SystemResourceSampler {
    /// Create a new sampler
    ///
    /// # Example
    /// ```ignore
    /// let executor = BoundedConcurrencyExecutor::new(ctx, 16);
    /// let sampler = SystemResourceSampler::new(executor.gauge());
    /// ```
    pub fn new(workers: InFlightGauge) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(error = e, "Current pid unavailable, app memory will not be sampled");
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            workers,
        }
    }
}

#[async_trait]
impl ResourceSampler for SystemResourceSampler {
    async fn app_memory(&self) -> Result<u64> {
        let pid = self
            .pid
            .ok_or_else(|| AppError::Sampler("current pid unavailable".to_string()))?;

        let mut sys = self.system.lock();
        if !sys.refresh_process(pid) {
            return Err(AppError::Sampler(format!("process {pid} not found")));
        }
        let rss = sys.process(pid).map(|p| p.memory()).unwrap_or(0);
        Ok(rss)
    }

    async fn system_memory(&self) -> Result<SystemMemory> {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let memory = SystemMemory {
            used_bytes: sys.used_memory(),
            total_bytes: sys.total_memory(),
        };
        if memory.total_bytes == 0 {
            return Err(AppError::Sampler("total memory reported as zero".to_string()));
        }
        Ok(memory)
    }

    async fn cpu_percent(&self, window: Duration) -> Result<f64> {
        // Usage is a delta between two refreshes
        self.system.lock().refresh_cpu();
        tokio::time::sleep(window.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;

        let mut sys = self.system.lock();
        sys.refresh_cpu();
        let usage = sys.global_cpu_info().cpu_usage() as f64;

        debug!(cpu = %format!("{usage:.1}"), window_ms = window.as_millis() as u64, "CPU sampled");
        Ok(usage.clamp(0.0, 100.0))
    }

    fn worker_count(&self) -> usize {
        self.workers.get()
    }
}
