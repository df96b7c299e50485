//! Keepalive loop and debounced status flushes.
//!
//! Both are single-slot: one keepalive per live socket, one pending status
//! flush at a time. Bursts of sequence advances collapse into one flush that
//! reports whatever the state is when it fires.

use std::future::Future;
use std::time::Duration;

use super::timer::TimerSlot;

#[derive(Debug)]
pub struct Liveness {
    keepalive_interval: Duration,
    status_debounce: Duration,
    keepalive: TimerSlot,
    status_flush: TimerSlot,
}

impl Liveness {
    pub fn new(keepalive_interval: Duration, status_debounce: Duration) -> Self {
        Self {
            keepalive_interval,
            status_debounce,
            keepalive: TimerSlot::new(),
            status_flush: TimerSlot::new(),
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// Replace any running keepalive with `task(token)`
    pub fn start_keepalive<F, Fut>(&mut self, task: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.keepalive.cancel();
        // Slot was just emptied, so this always arms.
        self.keepalive.spawn_if_absent(task).unwrap_or_default()
    }

    pub fn stop_keepalive(&mut self) -> bool {
        self.keepalive.cancel()
    }

    #[inline]
    pub fn keepalive_is_current(&self, token: u64) -> bool {
        self.keepalive.is_current(token)
    }

    pub fn keepalive_armed(&self) -> bool {
        self.keepalive.is_armed()
    }

    /// Schedule a status flush unless one is already pending
    pub fn request_status_flush<F, Fut>(&mut self, flush: F) -> bool
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.status_flush
            .schedule_if_absent(self.status_debounce, flush)
            .is_some()
    }

    pub fn take_status_flush(&mut self, token: u64) -> bool {
        self.status_flush.take_fired(token)
    }

    pub fn status_flush_armed(&self) -> bool {
        self.status_flush.is_armed()
    }

    pub fn cancel_all(&mut self) {
        self.keepalive.cancel();
        self.status_flush.cancel();
    }
}
