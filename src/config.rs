//! Session client configuration
//!
//! Production defaults with environment overrides. Unparsable overrides fall
//! back to the default rather than failing startup.

use std::time::Duration;

/// Default realtime endpoint for a locally running companion backend
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8787/v1/realtime";

/// Tunables for one session client
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base WebSocket URL; `session_id` and `resume_from` are appended per attempt
    pub endpoint: String,

    // Backoff parameters
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_cap_exponent: u32,
    pub jitter_factor: f64,

    // Liveness
    pub keepalive_interval_ms: u64,
    pub status_debounce_ms: u64,

    // Transport limits
    pub max_message_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),

            // Backoff: 250ms base, doubling, saturates at 5s after 8 attempts, no jitter
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
            backoff_cap_exponent: 8,
            jitter_factor: 0.0,

            keepalive_interval_ms: 25_000,
            status_debounce_ms: 200,

            max_message_bytes: 16 * 1024 * 1024,
        }
    }
}

impl SessionConfig {
    /// Load from environment with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SESSION_ENDPOINT") {
            if !v.trim().is_empty() {
                config.endpoint = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("SESSION_BACKOFF_BASE_MS") {
            config.backoff_base_ms = v.parse().unwrap_or(config.backoff_base_ms);
        }
        if let Ok(v) = std::env::var("SESSION_BACKOFF_MAX_MS") {
            config.backoff_max_ms = v.parse().unwrap_or(config.backoff_max_ms);
        }
        if let Ok(v) = std::env::var("SESSION_BACKOFF_CAP_EXPONENT") {
            config.backoff_cap_exponent = v.parse().unwrap_or(config.backoff_cap_exponent);
        }
        if let Ok(v) = std::env::var("SESSION_BACKOFF_JITTER") {
            config.jitter_factor = v
                .parse::<f64>()
                .ok()
                .filter(|j| (0.0..=1.0).contains(j))
                .unwrap_or(config.jitter_factor);
        }
        if let Ok(v) = std::env::var("SESSION_KEEPALIVE_MS") {
            config.keepalive_interval_ms = v
                .parse::<u64>()
                .ok()
                .filter(|&ms| ms > 0)
                .unwrap_or(config.keepalive_interval_ms);
        }
        if let Ok(v) = std::env::var("SESSION_STATUS_DEBOUNCE_MS") {
            config.status_debounce_ms = v.parse().unwrap_or(config.status_debounce_ms);
        }
        if let Ok(v) = std::env::var("SESSION_MAX_MESSAGE_BYTES") {
            config.max_message_bytes = v
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .unwrap_or(config.max_message_bytes);
        }

        config
    }

    /// Builder-style endpoint override
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn status_debounce(&self) -> Duration {
        Duration::from_millis(self.status_debounce_ms)
    }
}
