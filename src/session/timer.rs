//! Single-slot cancelable task.
//!
//! Each slot holds at most one spawned task. Every arm gets a fresh token; a
//! task that wakes up must present its token (under the owner's lock) before
//! acting, so a cancel that races with the wake-up still wins.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct TimerSlot {
    armed: Option<(u64, JoinHandle<()>)>,
    next_token: u64,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Whether `token` belongs to the currently armed task
    #[inline]
    pub fn is_current(&self, token: u64) -> bool {
        matches!(self.armed, Some((t, _)) if t == token)
    }

    /// Run `task(token)` after `delay`, unless something is already armed
    pub fn schedule_if_absent<F, Fut>(&mut self, delay: Duration, task: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_if_absent(|token| {
            let fut = task(token);
            async move {
                tokio::time::sleep(delay).await;
                fut.await;
            }
        })
    }

    /// Spawn `task(token)` now, unless something is already armed
    pub fn spawn_if_absent<F, Fut>(&mut self, task: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.armed.is_some() {
            return None;
        }
        self.next_token += 1;
        let token = self.next_token;
        let handle = tokio::spawn(task(token));
        self.armed = Some((token, handle));
        Some(token)
    }

    /// Claim a fired single-shot task. Clears the slot without aborting,
    /// since the caller is that task.
    pub fn take_fired(&mut self, token: u64) -> bool {
        if self.is_current(token) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    /// Abort whatever is armed. Returns whether anything was.
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn test_schedule_is_idempotent() {
        let mut slot = TimerSlot::new();
        let fired = Arc::new(AtomicU32::new(0));

        let f1 = fired.clone();
        let first = slot.schedule_if_absent(Duration::from_millis(20), move |_| async move {
            f1.fetch_add(1, Ordering::SeqCst);
        });
        let f2 = fired.clone();
        let second = slot.schedule_if_absent(Duration::from_millis(20), move |_| async move {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(first.is_some());
        assert!(second.is_none());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let mut slot = TimerSlot::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        slot.schedule_if_absent(Duration::from_millis(20), move |_| async move {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert!(slot.cancel());
        assert!(!slot.is_armed());
        assert!(!slot.cancel());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_token_cannot_claim() {
        let mut slot = TimerSlot::new();
        let old = slot
            .schedule_if_absent(Duration::from_secs(60), |_| async {})
            .unwrap();
        slot.cancel();
        let new = slot
            .schedule_if_absent(Duration::from_secs(60), |_| async {})
            .unwrap();

        assert_ne!(old, new);
        assert!(!slot.take_fired(old));
        assert!(slot.is_armed());
        assert!(slot.take_fired(new));
        assert!(!slot.is_armed());
    }
}
