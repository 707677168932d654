//! Probewatch - Scan Runner Entry Point
//! Resource-bounded HTTP probing with graceful shutdown

mod config;
mod probe;
mod scan;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use probewatch_core::application::{
    BoundedConcurrencyExecutor, ResourceMonitor, RetryExecutor, ServiceHandle, ShutdownManager,
    TracingProgressReporter,
};
use probewatch_core::port::id_provider::UuidProvider;
use probewatch_core::port::time_provider::SystemTimeProvider;
use probewatch_core::port::{IdProvider, ProgressReporter};
use probewatch_infra_system::SystemResourceSampler;

use config::Args;
use probe::HttpProber;
use scan::ScanSettings;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const MONITOR_SERVICE: &str = "resource-monitor";

fn init_logging() -> Result<()> {
    let log_format = std::env::var("PROBEWATCH_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("probewatch=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse configuration and initialize logging
    let args = Args::parse();
    init_logging()?;

    info!(
        core_version = probewatch_core::VERSION,
        "Probewatch v{} starting...",
        VERSION
    );

    let thresholds = args.thresholds()?;
    let retry_policy = args.retry_policy()?;

    // 2. Root context: cancelled by Ctrl+C or by the resource monitor
    let root = CancellationToken::new();

    // 3. Setup dependencies (DI wiring)
    let progress: Arc<dyn ProgressReporter> = Arc::new(TracingProgressReporter);
    let executor = BoundedConcurrencyExecutor::new(root.clone(), args.concurrency);
    let sampler = Arc::new(SystemResourceSampler::new(executor.gauge()));

    let monitor = Arc::new(
        ResourceMonitor::new(thresholds, sampler, Arc::new(SystemTimeProvider))
            .with_progress(progress.clone()),
    );
    {
        let root = root.clone();
        monitor.set_shutdown_callback(move || {
            warn!("Resource pressure, cancelling scan");
            root.cancel();
        });
    }

    let prober = Arc::new(HttpProber::new(
        args.request_timeout(),
        RetryExecutor::new(retry_policy),
        executor,
    )?);

    // 4. Start services
    let manager = ShutdownManager::new();
    let monitor_handle = Arc::new(ServiceHandle::with_lifecycle(MONITOR_SERVICE, monitor.clone()));
    monitor_handle
        .start(root.clone())
        .await
        .context("Resource monitor start failed")?;
    manager.register(MONITOR_SERVICE, monitor_handle).await;

    {
        let root = root.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    match res {
                        Ok(()) => info!("Shutdown signal received, cancelling scan..."),
                        Err(e) => error!(error = ?e, "Failed to listen for Ctrl+C"),
                    }
                    root.cancel();
                }
                _ = root.cancelled() => {}
            }
        });
    }

    // 5. Run the scan
    let session_id = UuidProvider.generate_id();
    let workflow = scan::build_workflow(
        ScanSettings {
            session_id,
            targets: args.targets.clone(),
            stop_on_error: !args.continue_on_error,
            step_timeout: args.step_timeout(),
        },
        monitor,
        prober,
        progress,
    );
    let result = workflow.execute(&root).await;

    // 6. Graceful shutdown
    info!("Stopping services...");
    if let Err(e) = manager.shutdown_all().await {
        error!(error = %e, "Service shutdown reported errors");
    }
    match manager
        .wait_for_all(&CancellationToken::new(), args.shutdown_grace())
        .await
    {
        Ok(report) if report.all_signaled() => info!("All services stopped"),
        Ok(report) => warn!(timed_out = ?report.timed_out, "Services did not stop within grace period"),
        Err(e) => error!(error = %e, "Waiting for services failed"),
    }
    root.cancel();

    info!("Shutdown complete.");

    if !result.success {
        anyhow::bail!(
            "scan {} failed at step {}",
            result.session_id,
            result.failed_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
