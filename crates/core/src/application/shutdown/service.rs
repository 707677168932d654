// Named service wrapped around a GracefulShutdown

use super::graceful::GracefulShutdown;
use crate::error::{AppError, Result};
use crate::port::ServiceLifecycle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Lifecycle handle of an independently running subsystem
///
/// idle -> running (start succeeds) -> stop-requested -> stopped
///
/// A stopped handle may be started again; a successful restart re-arms its
/// shutdown signal.
pub struct ServiceHandle {
    name: String,
    running: AtomicBool,
    shutdown: GracefulShutdown,
    lifecycle: Option<Arc<dyn ServiceLifecycle>>,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("shutdown_requested", &self.shutdown.is_requested())
            .finish()
    }
}

impl ServiceHandle {
    /// Handle without owner routines: start/stop only flip state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: AtomicBool::new(false),
            shutdown: GracefulShutdown::new(),
            lifecycle: None,
        }
    }

    /// Handle delegating to owner-supplied routines
    pub fn with_lifecycle(name: impl Into<String>, lifecycle: Arc<dyn ServiceLifecycle>) -> Self {
        Self {
            lifecycle: Some(lifecycle),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The signal this handle fires when stopped
    pub fn shutdown_signal(&self) -> GracefulShutdown {
        self.shutdown.clone()
    }

    /// Start the service
    ///
    /// # Errors
    /// - `AlreadyRunning` if the handle is running
    /// - the owner's start error, in which case the handle stays idle
    pub async fn start(&self, ctx: CancellationToken) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::AlreadyRunning(self.name.clone()));
        }

        if let Some(lifecycle) = &self.lifecycle {
            if let Err(e) = lifecycle.start(ctx).await {
                self.running.store(false, Ordering::Release);
                error!(service = %self.name, error = %e, "Service failed to start");
                return Err(e);
            }
        }

        if self.shutdown.rearm() {
            info!(service = %self.name, "Shutdown signal re-armed");
        }
        info!(service = %self.name, "Service started");
        Ok(())
    }

    /// Stop the service
    ///
    /// Always runs the owner's stop routine, signals shutdown and ends in the
    /// stopped state; the routine's error is still returned.
    pub async fn stop(&self) -> Result<()> {
        let result = match &self.lifecycle {
            Some(lifecycle) => lifecycle.stop().await,
            None => Ok(()),
        };

        self.running.store(false, Ordering::Release);
        self.shutdown.stop();

        match &result {
            Ok(()) => info!(service = %self.name, "Service stopped"),
            Err(e) => error!(service = %self.name, error = %e, "Service stop routine failed"),
        }
        result
    }

    /// `NotRunning` when stopped, otherwise the owner's health check
    pub async fn health(&self) -> Result<()> {
        if !self.is_running() {
            return Err(AppError::NotRunning(self.name.clone()));
        }
        match &self.lifecycle {
            Some(lifecycle) => lifecycle.health().await,
            None => Ok(()),
        }
    }

    /// Wait for this service's shutdown signal
    pub async fn wait(&self, ctx: &CancellationToken) -> Result<()> {
        self.shutdown.wait(ctx).await
    }

    pub async fn wait_with_timeout(&self, ctx: &CancellationToken, timeout: Duration) -> Result<()> {
        self.shutdown.wait_with_timeout(ctx, timeout).await
    }
}
