//! Resource Guard Tests
//!
//! The resource monitor's auto-shutdown cancels the root context, and every
//! pipeline running under that context stops at its current step.

use probewatch_core::application::{
    Pipeline, PipelineStep, ResourceMonitor, StepContext, WorkflowExecutor, WorkflowStep,
};
use probewatch_core::domain::{ResourceThresholds, MIB};
use probewatch_core::error::AppError;
use probewatch_core::port::resource_sampler::mocks::MockResourceSampler;
use probewatch_core::port::time_provider::FixedTimeProvider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn thresholds() -> ResourceThresholds {
    ResourceThresholds {
        system_memory_shutdown_fraction: 0.5,
        sample_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

fn guarded_monitor(root: &CancellationToken, sampler: Arc<MockResourceSampler>) -> ResourceMonitor {
    let monitor = ResourceMonitor::new(thresholds(), sampler, Arc::new(FixedTimeProvider(0)));
    let root = root.clone();
    monitor.set_shutdown_callback(move || root.cancel());
    monitor
}

/// Memory pressure in the middle of a step aborts the workflow at that step
#[tokio::test(start_paused = true)]
async fn test_memory_pressure_cancels_running_workflow() {
    let root = CancellationToken::new();
    let sampler = Arc::new(MockResourceSampler::healthy());
    let monitor = guarded_monitor(&root, sampler.clone());
    monitor.start_with(&root);

    let mut workflow: WorkflowExecutor<u32> = WorkflowExecutor::new("scan", "session-1", false);
    workflow
        .add_step(WorkflowStep::new("crawl", |ctx: StepContext<u32>| async move {
            ctx.results.insert("pages", 3);
            Ok::<(), AppError>(())
        }))
        .add_step(WorkflowStep::new("probe", move |ctx: StepContext<u32>| {
            let sampler = sampler.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                sampler.set_system_memory_percent(60.0);
                ctx.ctx.cancelled().await;
                Ok::<(), AppError>(())
            }
        }))
        .add_step(
            WorkflowStep::new("report", |_ctx: StepContext<u32>| async {
                Ok::<(), AppError>(())
            })
            .optional(),
        );

    let result = workflow.execute(&root).await;

    assert!(root.is_cancelled());
    assert!(!result.success);
    assert_eq!(result.failed_at.as_deref(), Some("probe"));
    assert!(result.was_cancelled());
    assert!(result.step("crawl").unwrap().success);
    assert!(!result.step("report").unwrap().ran);
    assert_eq!(result.output.unwrap().get("pages"), Some(&3));

    monitor.stop().await;
    assert!(!monitor.is_running());
}

/// A healthy host never fires the callback, so the chain completes
#[tokio::test(start_paused = true)]
async fn test_healthy_monitor_lets_pipeline_finish() {
    let root = CancellationToken::new();
    let sampler = Arc::new(MockResourceSampler::healthy());
    let monitor = guarded_monitor(&root, sampler.clone());
    monitor.start_with(&root);

    let pipeline = Pipeline::new("discover", "session-2", true)
        .step(PipelineStep::new(
            "seed",
            |_ctx: CancellationToken, urls: Vec<String>| async move {
                tokio::time::sleep(Duration::from_millis(350)).await;
                let mut urls = urls;
                urls.push("https://example.test/".to_string());
                Ok::<_, AppError>(urls)
            },
        ))
        .step(PipelineStep::new(
            "expand",
            |_ctx: CancellationToken, urls: Vec<String>| async move {
                let mut urls = urls;
                urls.push("https://example.test/about".to_string());
                Ok::<_, AppError>(urls)
            },
        ));

    let result = pipeline.execute(&root, Vec::new()).await;

    assert!(result.success);
    assert_eq!(result.output.unwrap().len(), 2);
    assert!(!root.is_cancelled());
    assert!(sampler.system_memory_calls() >= 3);
    assert!(monitor.latest_sample().is_some());

    monitor.stop().await;
}

/// Auto-shutdown disabled: thresholds are crossed but nobody is cancelled
#[tokio::test(start_paused = true)]
async fn test_disabled_auto_shutdown_only_reports() {
    let root = CancellationToken::new();
    let sampler = Arc::new(MockResourceSampler::with_system_memory_percent(80.0));
    let fired = Arc::new(AtomicUsize::new(0));

    let monitor = ResourceMonitor::new(
        ResourceThresholds {
            auto_shutdown: false,
            ..thresholds()
        },
        sampler,
        Arc::new(FixedTimeProvider(0)),
    );
    {
        let fired = fired.clone();
        monitor.set_shutdown_callback(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    let report = monitor.tick().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(report.shutdown_trigger, Some("system_memory"));
    assert!(!report.callback_fired);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!root.is_cancelled());
}

/// App memory above the warning band runs the registered reclaim hooks
#[tokio::test]
async fn test_app_memory_pressure_runs_reclaim_hooks() {
    let sampler = Arc::new(MockResourceSampler::healthy());
    sampler.set_app_memory(1900 * MIB);
    let monitor = ResourceMonitor::new(thresholds(), sampler.clone(), Arc::new(FixedTimeProvider(0)));

    let compacted = Arc::new(AtomicUsize::new(0));
    {
        let compacted = compacted.clone();
        monitor.add_reclaim_hook(move || {
            compacted.fetch_add(1, Ordering::SeqCst);
        });
    }

    let report = monitor.tick().await;

    assert!(report.reclaimed);
    assert_eq!(compacted.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.reclaim_cycles(), 1);
    assert!(monitor.check_app_memory().await.is_ok());

    sampler.set_app_memory(4096 * MIB);
    assert!(matches!(
        monitor.check_app_memory().await,
        Err(AppError::ResourceLimit { resource: "app_memory", .. })
    ));
}
