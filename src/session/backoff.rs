//! Reconnect scheduling with capped exponential backoff.
//!
//! delay(k) = min(max, base * 2^min(k, cap)), optionally jittered by
//! ±jitter_factor and clamped back into [base, max].

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::timer::TimerSlot;
use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub cap_exponent: u32,
    pub jitter_factor: f64,
}

impl BackoffPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
            cap_exponent: config.backoff_cap_exponent,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Un-jittered delay before attempt `attempt`
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(self.cap_exponent).min(63);
        let ms = self.base_ms.saturating_mul(1u64 << exp).min(self.max_ms);
        Duration::from_millis(ms)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter_factor <= 0.0 {
            return nominal;
        }
        let factor = rand::thread_rng()
            .gen_range((1.0 - self.jitter_factor)..=(1.0 + self.jitter_factor));
        let ms = (nominal.as_millis() as f64 * factor)
            .clamp(self.base_ms as f64, self.max_ms.max(self.base_ms) as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Attempt counter plus the one outstanding retry timer
#[derive(Debug)]
pub struct ReconnectScheduler {
    policy: BackoffPolicy,
    attempt: u32,
    timer: TimerSlot,
}

impl ReconnectScheduler {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            timer: TimerSlot::new(),
        }
    }

    /// Reset on successful open or explicit connect
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// Arm the retry timer for the next attempt.
    ///
    /// Returns `None` without touching the counter if a timer is already armed.
    pub fn schedule<F, Fut>(&mut self, fire: F) -> Option<(u32, Duration)>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.timer.is_armed() {
            return None;
        }
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.policy.delay_for(self.attempt);
        self.timer.schedule_if_absent(delay, fire)?;
        Some((self.attempt, delay))
    }

    /// Claim the timer from inside its own task
    pub fn take_fired(&mut self, token: u64) -> bool {
        self.timer.take_fired(token)
    }

    pub fn cancel(&mut self) -> bool {
        self.timer.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::from_config(&SessionConfig::default())
    }

    #[test]
    fn test_backoff_sequence() {
        let p = policy();
        let expected = [250, 500, 1000, 2000, 4000, 5000, 5000, 5000, 5000, 5000];
        for (attempt, want) in expected.iter().enumerate() {
            assert_eq!(p.delay_for(attempt as u32), Duration::from_millis(*want));
        }
    }

    #[test]
    fn test_backoff_no_overflow() {
        let p = BackoffPolicy {
            base_ms: u64::MAX / 2,
            max_ms: u64::MAX,
            cap_exponent: 100,
            jitter_factor: 0.0,
        };
        assert_eq!(p.delay_for(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let p = BackoffPolicy {
            jitter_factor: 0.3,
            ..policy()
        };
        for attempt in 0..20 {
            let d = p.delay_for(attempt).as_millis() as u64;
            assert!((250..=5000).contains(&d), "attempt {attempt} gave {d}ms");
        }
    }

    #[tokio::test]
    async fn test_schedule_increments_once_per_armed_timer() {
        let mut scheduler = ReconnectScheduler::new(policy());

        let first = scheduler.schedule(|_| async {});
        assert_eq!(first, Some((1, Duration::from_millis(500))));

        // A second close/error while armed must not create another timer
        assert_eq!(scheduler.schedule(|_| async {}), None);
        assert_eq!(scheduler.attempt(), 1);
        assert!(scheduler.is_armed());

        assert!(scheduler.cancel());
        let next = scheduler.schedule(|_| async {});
        assert_eq!(next, Some((2, Duration::from_millis(1000))));

        scheduler.cancel();
        scheduler.reset();
        assert_eq!(scheduler.attempt(), 0);
    }
}
