use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A pending one-shot callback. Cancelling (or dropping) the handle before
/// the delay elapses prevents the callback from running.
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Release the handle without aborting. A callback that clears its own
    /// stored handle must use this: aborting would kill the very task that
    /// is still running the callback.
    pub fn disarm(mut self) {
        self.handle.take();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("armed", &self.handle.is_some())
            .finish()
    }
}

/// Run `callback` after `delay`, unless the returned handle is cancelled
/// first. Callbacks re-enter the owning service through its usual locking,
/// so they serialize with message handling.
pub fn schedule<F>(delay: Duration, callback: F) -> ScheduledTask
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        callback.await;
    });
    ScheduledTask {
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _task = schedule(Duration::from_millis(10), async move {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let task = schedule(Duration::from_millis(10), async move {
            flag.store(true, Ordering::SeqCst);
        });
        task.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_the_handle_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        drop(schedule(Duration::from_millis(10), async move {
            flag.store(true, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
