//! Session counters for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free session counters
#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub connect_attempts: AtomicU64,
    pub connects_opened: AtomicU64,
    pub connect_failures: AtomicU64,
    pub socket_closes: AtomicU64,
    pub reconnects_scheduled: AtomicU64,
    pub frames_received: AtomicU64,
    pub frames_malformed: AtomicU64,
    pub acks_sent: AtomicU64,
    pub ack_failures: AtomicU64,
    pub pings_sent: AtomicU64,
    pub ping_failures: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connect_opened(&self) {
        self.connects_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_socket_close(&self) {
        self.socket_closes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed_frame(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ack(&self, ok: bool) {
        if ok {
            self.acks_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ack_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_ping(&self, ok: bool) {
        if ok {
            self.pings_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ping_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Summary string for logging
    pub fn summary(&self) -> String {
        format!(
            "connects={}/{} failures={} closes={} reconnects={} frames={} malformed={} acks={}/{} pings={}/{}",
            self.connects_opened.load(Ordering::Relaxed),
            self.connect_attempts.load(Ordering::Relaxed),
            self.connect_failures.load(Ordering::Relaxed),
            self.socket_closes.load(Ordering::Relaxed),
            self.reconnects_scheduled.load(Ordering::Relaxed),
            self.frames_received.load(Ordering::Relaxed),
            self.frames_malformed.load(Ordering::Relaxed),
            self.acks_sent.load(Ordering::Relaxed),
            self.acks_sent.load(Ordering::Relaxed) + self.ack_failures.load(Ordering::Relaxed),
            self.pings_sent.load(Ordering::Relaxed),
            self.pings_sent.load(Ordering::Relaxed) + self.ping_failures.load(Ordering::Relaxed),
        )
    }
}
