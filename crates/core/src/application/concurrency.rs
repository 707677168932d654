// Bounded concurrency gate
use crate::error::{AppError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared count of operations currently holding a permit
///
/// Cloned into the resource sampler so the monitor sees live workers.
#[derive(Debug, Clone, Default)]
pub struct InFlightGauge(Arc<AtomicUsize>);

impl InFlightGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn enter(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        InFlightGuard(self.clone())
    }
}

struct InFlightGuard(InFlightGauge);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Caps simultaneous in-flight operations with a fixed permit pool
///
/// Constructed once and cloned into every subsystem that fans out work.
#[derive(Debug, Clone)]
pub struct BoundedConcurrencyExecutor {
    ctx: CancellationToken,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    gauge: InFlightGauge,
}

impl BoundedConcurrencyExecutor {
    /// # Arguments
    /// * `ctx` - Token observed before and during permit acquisition
    /// * `max_concurrency` - Permit pool size (clamped to at least 1)
    pub fn new(ctx: CancellationToken, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            ctx,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            gauge: InFlightGauge::new(),
        }
    }

    /// Report in-flight operations through an externally owned gauge
    pub fn with_gauge(mut self, gauge: InFlightGauge) -> Self {
        self.gauge = gauge;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.gauge.get()
    }

    pub fn gauge(&self) -> InFlightGauge {
        self.gauge.clone()
    }

    /// Run `operation` once a permit is available
    ///
    /// Cancellation is checked before acquiring, while waiting, and again
    /// right after acquiring. The permit is released on every exit path.
    pub async fn execute<T, Fut>(&self, label: &str, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        if self.ctx.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let _permit = tokio::select! {
            permit = self.semaphore.acquire() => permit
                .map_err(|_| AppError::Internal("concurrency permit pool closed".to_string()))?,
            _ = self.ctx.cancelled() => return Err(AppError::Cancelled),
        };

        // Cancellation may have raced the acquisition
        if self.ctx.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let _in_flight = self.gauge.enter();
        debug!(
            label = label,
            in_flight = self.gauge.get(),
            max = self.max_concurrency,
            "Permit acquired"
        );

        operation.await
    }
}
