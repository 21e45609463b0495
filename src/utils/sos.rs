//! Signal-of-Stop: cooperative cancellation primitive.
//!
//! Provides a cloneable, async-aware cancellation token that can be:
//! - Shared across tasks (the node loop, the console, every peer worker)
//! - Awaited in `select!` to stop a loop
//! - Queried synchronously

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// A cooperative cancellation token.
///
/// Clones share the same underlying state, so cancelling any clone
/// wakes every waiter. Cancellation is sticky.
#[derive(Debug, Clone)]
pub struct SignalOfStop {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for SignalOfStop {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalOfStop {
    /// Create a new, uncancelled signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal cancellation to all waiters.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check if cancellation has been signaled.
    pub fn cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for cancellation to be signaled.
    ///
    /// Returns immediately if already cancelled.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so `wait_for` cannot fail
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Race a future against cancellation.
    ///
    /// Returns `Some(T)` if the future completes first,
    /// `None` if cancellation is signaled first.
    pub async fn select<F, T>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.wait() => None,
            res = fut => Some(res),
        }
    }
}
