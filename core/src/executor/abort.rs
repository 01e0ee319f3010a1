use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation signal handed to abortable call functions.
///
/// Aborting never interrupts the call: the call is expected to observe the
/// signal and stop on its own. Whatever it settles with afterwards is
/// classified as aborted.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn abort(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Completes once the signal has been aborted.
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn waiters_wake_on_abort() {
        let signal = AbortSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.aborted().await })
        };

        tokio::task::yield_now().await;
        assert!(!signal.is_aborted());
        signal.abort();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn already_aborted_returns_immediately() {
        let signal = AbortSignal::new();
        signal.abort();
        signal.aborted().await;
    }
}
