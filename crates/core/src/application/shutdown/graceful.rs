// Graceful shutdown signal

use crate::error::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shutdown signal (armed -> signaled), re-armed only through `rearm`
///
/// Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct GracefulShutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal shutdown. Returns true only for the call that flipped the signal.
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|signaled| {
            if *signaled {
                false
            } else {
                *signaled = true;
                true
            }
        })
    }

    /// Return a signaled instance to armed so it can be stopped again.
    /// Returns true only if the signal was set.
    pub fn rearm(&self) -> bool {
        self.tx.send_if_modified(|signaled| std::mem::replace(signaled, false))
    }

    /// Non-blocking poll
    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown is signaled (`Ok`) or `ctx` is cancelled
    pub async fn wait(&self, ctx: &CancellationToken) -> Result<()> {
        let mut rx = self.tx.subscribe();
        tokio::select! {
            // The sender lives as long as self, so wait_for only fails on a dropped channel
            res = rx.wait_for(|signaled| *signaled) => res
                .map(|_| ())
                .map_err(|_| AppError::Internal("shutdown channel closed".to_string())),
            _ = ctx.cancelled() => Err(AppError::Cancelled),
        }
    }

    /// Like `wait`, bounded by `timeout`; elapsing yields `Timeout`, distinct from `Cancelled`
    pub async fn wait_with_timeout(
        &self,
        ctx: &CancellationToken,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, self.wait(ctx)).await {
            Ok(res) => res,
            Err(_) => Err(AppError::Timeout(timeout)),
        }
    }
}
