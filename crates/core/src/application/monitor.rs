//! Resource Monitor - periodic sampling with reclaim and auto-shutdown
//!
//! Per tick:
//! 1. Sample once
//! 2. System memory above its shutdown fraction: fire the shutdown callback, skip the rest
//! 3. Else CPU above its shutdown fraction: same
//! 4. Else app memory above its warning band: run a reclaim pass
//! 5. Worker count above its warning band: warn only

use crate::domain::{ResourceSample, ResourceThresholds, MIB};
use crate::error::{AppError, Result};
use crate::port::{
    NoopProgressReporter, ProgressEvent, ProgressReporter, ResourceSampler, ServiceLifecycle,
    TimeProvider,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Invoked on a spawned task when a shutdown threshold is crossed
pub type ShutdownCallback = Arc<dyn Fn() + Send + Sync>;

/// Allocator-pressure hook run by a reclaim pass (pool compaction, cache trimming)
pub type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

/// What a single tick decided
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Resource that crossed its shutdown threshold, if any
    pub shutdown_trigger: Option<&'static str>,
    /// Whether the shutdown callback was dispatched
    pub callback_fired: bool,
    pub reclaimed: bool,
    pub worker_warning: bool,
}

struct MonitorInner {
    thresholds: ResourceThresholds,
    sampler: Arc<dyn ResourceSampler>,
    time_provider: Arc<dyn TimeProvider>,
    progress: RwLock<Arc<dyn ProgressReporter>>,
    shutdown_callback: Mutex<Option<ShutdownCallback>>,
    reclaim_hooks: Mutex<Vec<ReclaimHook>>,
    reclaim_cycles: AtomicU64,
    latest: Mutex<Option<ResourceSample>>,
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Self-protective resource monitor
pub struct ResourceMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<MonitorTask>>,
}

impl ResourceMonitor {
    /// Create a new monitor
    ///
    /// # Arguments
    /// * `thresholds` - Limits and sampling schedule
    /// * `sampler` - Source of resource readings
    /// * `time_provider` - Clock for sample timestamps
    pub fn new(
        thresholds: ResourceThresholds,
        sampler: Arc<dyn ResourceSampler>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                thresholds,
                sampler,
                time_provider,
                progress: RwLock::new(Arc::new(NoopProgressReporter)),
                shutdown_callback: Mutex::new(None),
                reclaim_hooks: Mutex::new(Vec::new()),
                reclaim_cycles: AtomicU64::new(0),
                latest: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Forward samples and alerts to `progress`
    pub fn with_progress(self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.set_progress(progress);
        self
    }

    /// Swap the progress sink; a running loop picks it up on its next tick
    pub fn set_progress(&self, progress: Arc<dyn ProgressReporter>) {
        *self.inner.progress.write() = progress;
    }

    pub fn thresholds(&self) -> &ResourceThresholds {
        &self.inner.thresholds
    }

    /// Register the auto-shutdown callback, replacing any previous one
    pub fn set_shutdown_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.shutdown_callback.lock() = Some(Arc::new(callback));
    }

    pub fn add_reclaim_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.reclaim_hooks.lock().push(Arc::new(hook));
    }

    /// False once stopped, or once the loop ended because its parent token fired
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }

    pub fn latest_sample(&self) -> Option<ResourceSample> {
        self.inner.latest.lock().clone()
    }

    pub fn reclaim_cycles(&self) -> u64 {
        self.inner.reclaim_cycles.load(Ordering::Acquire)
    }

    /// Begin periodic sampling. No-op if already running.
    pub fn start(&self) {
        self.spawn_loop(CancellationToken::new());
    }

    /// Begin sampling under `ctx`: cancelling `ctx` also ends the loop
    pub fn start_with(&self, ctx: &CancellationToken) {
        self.spawn_loop(ctx.child_token());
    }

    fn spawn_loop(&self, cancel: CancellationToken) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("Resource monitor already running");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run(token).await });
        *task = Some(MonitorTask { cancel, handle });

        info!(
            interval_ms = self.inner.thresholds.sample_interval.as_millis() as u64,
            auto_shutdown = self.inner.thresholds.auto_shutdown,
            "Resource monitor started"
        );
    }

    /// Stop sampling and wait for the loop to exit
    ///
    /// No sample executes after this returns.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            error!(error = ?e, "Resource monitor task ended abnormally");
        }
        info!("Resource monitor stopped");
    }

    /// Run a single monitoring tick
    pub async fn tick(&self) -> TickReport {
        self.inner.tick().await
    }

    /// Sample every reading once; failed readings are logged and reported as zero
    pub async fn sample(&self) -> ResourceSample {
        self.inner.sample().await
    }

    /// # Errors
    /// `ResourceLimit` if app memory exceeds the configured maximum
    pub async fn check_app_memory(&self) -> Result<()> {
        let current = self.inner.sampler.app_memory().await?;
        let limit = self.inner.thresholds.max_app_memory_bytes;
        if current > limit {
            return Err(AppError::ResourceLimit {
                resource: "app_memory",
                current,
                limit,
            });
        }
        Ok(())
    }

    /// # Errors
    /// `ResourceLimit` if the live worker count exceeds the configured maximum
    pub async fn check_worker_count(&self) -> Result<()> {
        let current = self.inner.sampler.worker_count();
        let limit = self.inner.thresholds.max_workers;
        if current > limit {
            return Err(AppError::ResourceLimit {
                resource: "workers",
                current: current as u64,
                limit: limit as u64,
            });
        }
        Ok(())
    }

    /// True when used system memory exceeds the shutdown fraction
    ///
    /// Sampler failures are returned as `Err`; callers treat them as non-fatal.
    pub async fn check_system_memory(&self) -> Result<bool> {
        let memory = self.inner.sampler.system_memory().await?;
        Ok(memory.percent() / 100.0 > self.inner.thresholds.system_memory_shutdown_fraction)
    }

    /// True when CPU usage over the sampling window exceeds the shutdown fraction
    pub async fn check_cpu(&self) -> Result<bool> {
        let cpu = self
            .inner
            .sampler
            .cpu_percent(self.inner.thresholds.cpu_sample_window)
            .await?;
        Ok(cpu / 100.0 > self.inner.thresholds.cpu_shutdown_fraction)
    }

    /// Run a reclaim pass and log app memory before and after
    pub async fn force_reclaim(&self) {
        self.inner.force_reclaim().await
    }
}

impl MonitorInner {
    fn reporter(&self) -> Arc<dyn ProgressReporter> {
        self.progress.read().clone()
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.thresholds.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
        }
        debug!("Resource monitor loop exited");
    }

    async fn sample(&self) -> ResourceSample {
        let app_memory_bytes = self.sampler.app_memory().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to sample app memory");
            0
        });

        let (system_memory_used_bytes, system_memory_total_bytes, system_memory_percent) =
            match self.sampler.system_memory().await {
                Ok(memory) => (memory.used_bytes, memory.total_bytes, memory.percent()),
                Err(e) => {
                    warn!(error = %e, "Failed to sample system memory");
                    (0, 0, 0.0)
                }
            };

        let cpu_percent = self
            .sampler
            .cpu_percent(self.thresholds.cpu_sample_window)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to sample CPU");
                0.0
            });

        let sample = ResourceSample {
            timestamp: self.time_provider.now_millis(),
            app_memory_bytes,
            system_memory_used_bytes,
            system_memory_total_bytes,
            system_memory_percent,
            worker_count: self.sampler.worker_count(),
            cpu_percent,
            reclaim_cycles: self.reclaim_cycles.load(Ordering::Acquire),
        };

        debug!(
            app_mb = sample.app_memory_bytes / MIB,
            sys_mem_percent = %format!("{:.1}", sample.system_memory_percent),
            cpu_percent = %format!("{:.1}", sample.cpu_percent),
            workers = sample.worker_count,
            "Resource sample collected"
        );

        *self.latest.lock() = Some(sample.clone());
        self.reporter().report(ProgressEvent::ResourceSampled(sample.clone()));
        sample
    }

    async fn tick(&self) -> TickReport {
        let sample = self.sample().await;
        let thresholds = &self.thresholds;
        let mut report = TickReport::default();

        if sample.system_memory_fraction() > thresholds.system_memory_shutdown_fraction {
            error!(
                severity = "critical",
                used_percent = %format!("{:.1}", sample.system_memory_percent),
                threshold_percent = %format!("{:.1}", thresholds.system_memory_shutdown_fraction * 100.0),
                "System memory above shutdown threshold"
            );
            report.shutdown_trigger = Some("system_memory");
            report.callback_fired = self.trigger_shutdown(
                "system_memory",
                format!("system memory at {:.1}%", sample.system_memory_percent),
            );
            return report;
        }

        if sample.cpu_fraction() > thresholds.cpu_shutdown_fraction {
            error!(
                severity = "critical",
                cpu_percent = %format!("{:.1}", sample.cpu_percent),
                threshold_percent = %format!("{:.1}", thresholds.cpu_shutdown_fraction * 100.0),
                "CPU above shutdown threshold"
            );
            report.shutdown_trigger = Some("cpu");
            report.callback_fired =
                self.trigger_shutdown("cpu", format!("cpu at {:.1}%", sample.cpu_percent));
            return report;
        }

        if sample.app_memory_bytes > thresholds.app_memory_warning_bytes() {
            warn!(
                app_mb = sample.app_memory_bytes / MIB,
                warning_mb = thresholds.app_memory_warning_bytes() / MIB,
                "App memory above warning band, reclaiming"
            );
            self.force_reclaim().await;
            report.reclaimed = true;
        }

        if sample.worker_count > thresholds.worker_warning_count() {
            warn!(
                workers = sample.worker_count,
                warning = thresholds.worker_warning_count(),
                max = thresholds.max_workers,
                "Worker count above warning band"
            );
            self.reporter().report(ProgressEvent::ResourceAlert {
                resource: "workers",
                message: format!("{} live workers", sample.worker_count),
            });
            report.worker_warning = true;
        }

        report
    }

    /// Dispatch the callback off the sampling path. Returns whether it was dispatched.
    fn trigger_shutdown(&self, resource: &'static str, message: String) -> bool {
        self.reporter().report(ProgressEvent::ResourceAlert {
            resource,
            message: message.clone(),
        });

        if !self.thresholds.auto_shutdown {
            warn!(resource = resource, "Auto-shutdown disabled, not triggering shutdown");
            return false;
        }

        let callback = self.shutdown_callback.lock().clone();
        match callback {
            Some(callback) => {
                error!(resource = resource, reason = %message, "Triggering auto-shutdown");
                tokio::spawn(async move { callback() });
                true
            }
            None => {
                warn!(resource = resource, "No shutdown callback registered");
                false
            }
        }
    }

    async fn force_reclaim(&self) {
        let before = self.sampler.app_memory().await.ok();

        let hooks: Vec<ReclaimHook> = self.reclaim_hooks.lock().clone();
        for hook in &hooks {
            hook();
        }
        let cycles = self.reclaim_cycles.fetch_add(1, Ordering::AcqRel) + 1;

        let after = self.sampler.app_memory().await.ok();
        info!(
            before_mb = before.map(|b| b / MIB),
            after_mb = after.map(|a| a / MIB),
            hooks = hooks.len(),
            cycles = cycles,
            "Reclaim pass completed"
        );
    }
}

#[async_trait]
impl ServiceLifecycle for ResourceMonitor {
    async fn start(&self, ctx: CancellationToken) -> Result<()> {
        self.start_with(&ctx);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        ResourceMonitor::stop(self).await;
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(AppError::NotRunning("resource-monitor".to_string()))
        }
    }
}
