//! Cooperative cancellation shared by the scanner and the remediation engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Resettable cancellation flag.
///
/// Long-running operations poll [`is_cancelled`](Self::is_cancelled) at
/// their checkpoints; nothing is interrupted mid-flight. Unlike a one-shot
/// token the flag can be [`reset`](Self::reset), because the same flag is
/// reused when a paused scan is restarted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<Inner>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes any pacing sleep.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Clears a previous cancellation request.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, returning early if cancellation is requested.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }

        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = notified => false,
        }
    }
}
