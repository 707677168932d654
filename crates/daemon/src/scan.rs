// Scan workflow: preflight -> probe -> report

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use probewatch_core::application::{ResourceMonitor, StepContext, WorkflowExecutor, WorkflowStep};
use probewatch_core::domain::{ResourceSample, MIB};
use probewatch_core::error::AppError;
use probewatch_core::port::ProgressReporter;

use crate::probe::{HttpProber, ProbeReport};

pub const PREFLIGHT_KEY: &str = "preflight";
pub const PROBES_KEY: &str = "probes";

/// Values exchanged between scan steps
#[derive(Debug, Clone)]
pub enum ScanValue {
    Sample(ResourceSample),
    Probes(Vec<ProbeReport>),
}

pub struct ScanSettings {
    pub session_id: String,
    pub targets: Vec<String>,
    pub stop_on_error: bool,
    pub step_timeout: Duration,
}

pub fn build_workflow(
    settings: ScanSettings,
    monitor: Arc<ResourceMonitor>,
    prober: Arc<HttpProber>,
    progress: Arc<dyn ProgressReporter>,
) -> WorkflowExecutor<ScanValue> {
    let targets = Arc::new(settings.targets);
    let mut workflow = WorkflowExecutor::new("scan", settings.session_id, settings.stop_on_error)
        .with_progress(progress);

    workflow
        .add_step(
            WorkflowStep::new("preflight", move |ctx: StepContext<ScanValue>| {
                let monitor = Arc::clone(&monitor);
                async move { preflight(&monitor, &ctx).await }
            })
            .description("check resources before starting")
            .timeout(settings.step_timeout),
        )
        .add_step(
            WorkflowStep::new("probe", move |ctx: StepContext<ScanValue>| {
                let prober = Arc::clone(&prober);
                let targets = Arc::clone(&targets);
                async move { probe(&prober, &targets, &ctx).await }
            })
            .description("HEAD every target")
            .timeout(settings.step_timeout),
        )
        .add_step(
            WorkflowStep::new("report", |ctx: StepContext<ScanValue>| async move { report(&ctx) })
                .description("summarize probe results")
                .optional(),
        );
    workflow
}

async fn preflight(
    monitor: &ResourceMonitor,
    ctx: &StepContext<ScanValue>,
) -> probewatch_core::Result<()> {
    skip_unreadable(monitor.check_app_memory().await, "app_memory")?;
    skip_unreadable(monitor.check_worker_count().await, "workers")?;

    let sample = monitor.sample().await;
    let system_memory_breached =
        skip_unreadable(monitor.check_system_memory().await, "system_memory")?;
    if system_memory_breached == Some(true) {
        return Err(AppError::ResourceLimit {
            resource: "system_memory",
            current: sample.system_memory_percent as u64,
            limit: (monitor.thresholds().system_memory_shutdown_fraction * 100.0) as u64,
        });
    }

    info!(
        session_id = %ctx.session_id,
        app_mb = sample.app_memory_bytes / MIB,
        sys_mem_percent = %format!("{:.1}", sample.system_memory_percent),
        "Preflight passed"
    );
    ctx.results.insert(PREFLIGHT_KEY, ScanValue::Sample(sample));
    Ok(())
}

/// A reading the sampler could not take skips its check; limit breaches still fail
fn skip_unreadable<T>(
    checked: probewatch_core::Result<T>,
    check: &'static str,
) -> probewatch_core::Result<Option<T>> {
    match checked {
        Ok(value) => Ok(Some(value)),
        Err(AppError::Sampler(e)) => {
            warn!(check = check, error = %e, "Preflight reading unavailable, check skipped");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn probe(
    prober: &HttpProber,
    targets: &[String],
    ctx: &StepContext<ScanValue>,
) -> probewatch_core::Result<()> {
    let reports = prober.probe_all(&ctx.ctx, targets).await;
    if ctx.ctx.is_cancelled() {
        return Err(AppError::Cancelled);
    }

    let responded = reports.iter().filter(|r| r.responded()).count();
    ctx.results.insert(PROBES_KEY, ScanValue::Probes(reports));

    if responded == 0 && !targets.is_empty() {
        return Err(AppError::Execution(format!(
            "none of {} targets responded",
            targets.len()
        )));
    }
    Ok(())
}

fn report(ctx: &StepContext<ScanValue>) -> probewatch_core::Result<()> {
    let Some(ScanValue::Probes(reports)) = ctx.results.get(PROBES_KEY) else {
        return Err(AppError::Execution("no probe results to report".to_string()));
    };

    let ok = reports.iter().filter(|r| r.is_ok()).count();
    for r in reports.iter().filter(|r| !r.is_ok()) {
        warn!(
            url = %r.url,
            status = ?r.status,
            error = r.error.as_deref().unwrap_or("-"),
            "Target unhealthy"
        );
    }
    info!(
        session_id = %ctx.session_id,
        ok = ok,
        failed = reports.len() - ok,
        total = reports.len(),
        "Scan summary"
    );
    Ok(())
}
