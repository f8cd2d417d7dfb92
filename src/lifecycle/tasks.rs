//! Tracking of detached request side effects.
//!
//! Trace finalization and access logging run on spawned tasks after the
//! response is handed back. Every such task is counted here so shutdown and
//! tests can wait until all of them have run. Work whose task is discarded
//! before it starts (runtime shutting down) is counted and logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Counted wait-group for detached side effects.
#[derive(Debug, Clone, Default)]
pub struct SideEffectTracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicU64,
    dropped: AtomicU64,
    idle: Notify,
}

impl SideEffectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending side effect that the caller is already running.
    /// Returns a guard that completes it on drop.
    pub fn track(&self) -> SideEffectGuard {
        let mut guard = self.queue();
        guard.started = true;
        guard
    }

    fn queue(&self) -> SideEffectGuard {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        SideEffectGuard {
            inner: Arc::clone(&self.inner),
            started: false,
        }
    }

    /// Run `work` on the current Tokio runtime, counted until it finishes.
    ///
    /// Without a runtime the work runs inline, so it is never skipped.
    pub fn dispatch<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = self.queue();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    guard.started = true;
                    work();
                    drop(guard);
                });
            }
            Err(_) => {
                guard.started = true;
                work();
            }
        }
    }

    /// Number of side effects still pending.
    pub fn pending(&self) -> u64 {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Number of side effects discarded before they ran.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Wait until no side effects are pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait until idle or until `timeout` elapses. Returns `true` when idle.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}

/// Guard that tracks one side effect.
/// Decrements the pending count when dropped, even if the work panicked.
#[derive(Debug)]
pub struct SideEffectGuard {
    inner: Arc<Inner>,
    started: bool,
}

impl Drop for SideEffectGuard {
    fn drop(&mut self) {
        if !self.started {
            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("Observability side effect discarded before it ran");
        }
        if self.inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
