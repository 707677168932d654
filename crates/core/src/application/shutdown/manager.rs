// Shutdown registry spanning independently running services

use super::service::ServiceHandle;
use crate::error::{AppError, Result};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of `ShutdownManager::wait_for_all`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WaitReport {
    /// Services whose shutdown signal fired
    pub signaled: Vec<String>,
    /// Services still running when the per-service timeout elapsed
    pub timed_out: Vec<String>,
}

impl WaitReport {
    pub fn all_signaled(&self) -> bool {
        self.timed_out.is_empty()
    }
}

/// Registry that broadcasts and awaits shutdown across services
///
/// One instance is built at process start and injected wherever services
/// are registered.
#[derive(Debug, Default)]
pub struct ShutdownManager {
    services: RwLock<HashMap<String, Arc<ServiceHandle>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under `name`, replacing any previous one
    pub async fn register(&self, name: impl Into<String>, handle: Arc<ServiceHandle>) {
        let name = name.into();
        let previous = self.services.write().await.insert(name.clone(), handle);
        if previous.is_some() {
            warn!(service = %name, "Replaced previously registered service");
        } else {
            info!(service = %name, "Service registered");
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<ServiceHandle>> {
        self.services.read().await.get(name).cloned()
    }

    pub async fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<(String, Arc<ServiceHandle>)> {
        self.services
            .read()
            .await
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect()
    }

    /// Stop every registered service, each independently
    ///
    /// # Errors
    /// `Shutdown` naming every service whose stop routine failed; the others
    /// are still stopped.
    pub async fn shutdown_all(&self) -> Result<()> {
        let services = self.snapshot().await;
        info!(count = services.len(), "Shutting down all services");

        let results = join_all(services.iter().map(|(name, handle)| async move {
            (name.as_str(), handle.stop().await)
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, res)| res.err().map(|e| format!("{}: {}", name, e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Shutdown(failures.join("; ")))
        }
    }

    /// Wait for every service's shutdown signal concurrently
    ///
    /// Each service gets `timeout`; total wall time is bounded by the
    /// slowest service, not the sum.
    ///
    /// # Errors
    /// `Cancelled` if `ctx` fires first
    pub async fn wait_for_all(
        &self,
        ctx: &CancellationToken,
        timeout: Duration,
    ) -> Result<WaitReport> {
        let services = self.snapshot().await;

        let results = join_all(services.iter().map(|(name, handle)| async move {
            (name.clone(), handle.wait_with_timeout(ctx, timeout).await)
        }))
        .await;

        let mut report = WaitReport::default();
        for (name, res) in results {
            match res {
                Ok(()) => report.signaled.push(name),
                Err(AppError::Timeout(_)) => {
                    warn!(service = %name, timeout_ms = timeout.as_millis() as u64, "Service did not stop in time");
                    report.timed_out.push(name);
                }
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => return Err(e),
            }
        }
        report.signaled.sort();
        report.timed_out.sort();

        info!(
            signaled = report.signaled.len(),
            timed_out = report.timed_out.len(),
            "Finished waiting for services"
        );
        Ok(report)
    }

    /// Health of every registered service, sorted by name
    pub async fn health_all(&self) -> Vec<(String, Result<()>)> {
        let services = self.snapshot().await;
        let mut results = join_all(
            services
                .into_iter()
                .map(|(name, handle)| async move { (name, handle.health().await) }),
        )
        .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}
