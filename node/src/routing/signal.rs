//! Owner-level idle-wake signal
//!
//! A latched flag paired with `tokio::sync::Notify`: raising it wakes every
//! current waiter, and a raise with nobody waiting is remembered until the
//! next `wait` observes (and resets) it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct WakeSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Wait until raised. Returns false if `timeout` elapsed first.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a raise in between is not lost.
        notified.as_mut().enable();

        if self.raised.swap(false, Ordering::AcqRel) {
            return true;
        }

        match timeout {
            None => notified.await,
            Some(timeout) => {
                if tokio::time::timeout(timeout, notified).await.is_err() {
                    return self.raised.swap(false, Ordering::AcqRel);
                }
            }
        }
        self.raised.store(false, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_raise_before_wait_is_latched() {
        let signal = WakeSignal::new();
        signal.raise();
        assert!(signal.is_raised());
        assert!(signal.wait(Some(Duration::from_millis(1))).await);
        assert!(!signal.is_raised());
    }

    #[tokio::test]
    async fn test_wait_times_out_when_idle() {
        let signal = WakeSignal::new();
        assert!(!signal.wait(Some(Duration::from_millis(5))).await);
    }

    #[tokio::test]
    async fn test_raise_wakes_waiter() {
        let signal = Arc::new(WakeSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait(Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.raise();
        assert!(waiter.await.expect("waiter task"));
        assert!(!signal.is_raised());
    }
}
