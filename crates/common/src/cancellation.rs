//! Cooperative cancellation token.

use crate::errors::{AppError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation handle shared between a caller and the work it started.
///
/// Cancelling is idempotent and wakes every task awaiting [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled).
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` unless cancelled first; the future is dropped on cancellation.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        if self.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AppError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its token when dropped.
#[derive(Debug)]
pub struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
