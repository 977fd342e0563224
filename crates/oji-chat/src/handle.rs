//! A cloneable handle for cancelling and awaiting chat requests.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle onto the orchestrator's running request.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct ChatHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) idle_notify: Arc<tokio::sync::Notify>,
    pub(crate) is_running: Arc<AtomicBool>,
}

impl Default for ChatHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            idle_notify: Arc::new(tokio::sync::Notify::new()),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the running request. Partial output is kept.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Claim the handle for a new request and swap in a fresh token.
    ///
    /// Returns `None` while another request holds it.
    pub(crate) fn begin(&self) -> Option<CancellationToken> {
        let mut cancel = self.cancel.lock();
        if self
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let token = CancellationToken::new();
        *cancel = token.clone();
        Some(token)
    }

    pub(crate) fn finish(&self) {
        self.is_running.store(false, Ordering::Release);
        self.idle_notify.notify_waiters();
    }

    /// Wait until no request is running.
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_running.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// Wait until idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: std::time::Duration) -> bool {
        if !self.is_running.load(Ordering::Acquire) {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }

    /// Whether a request is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_idle_handle_returns_immediately() {
        let handle = ChatHandle::new();
        assert!(!handle.is_running());
        handle.wait_for_idle().await;
        assert!(handle.wait_for_idle_timeout(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_abort_cancels_current_token_only() {
        let handle = ChatHandle::new();
        let first = handle.begin().unwrap();
        handle.abort();
        assert!(first.is_cancelled());
        handle.finish();

        let second = handle.begin().unwrap();
        assert!(!second.is_cancelled());
        handle.finish();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_begin_refused_while_running() {
        let handle = ChatHandle::new();
        let first = handle.begin().unwrap();
        assert!(handle.begin().is_none());

        // The running request keeps its token and stays abortable
        handle.abort();
        assert!(first.is_cancelled());
        assert!(handle.is_running());

        handle.finish();
        assert!(handle.begin().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_idle_wakes_on_finish() {
        let handle = ChatHandle::new();
        assert!(handle.begin().is_some());
        assert!(!handle.wait_for_idle_timeout(Duration::from_millis(10)).await);

        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.wait_for_idle().await });
        tokio::task::yield_now().await;
        handle.finish();
        task.await.unwrap();
    }
}
