//! Fixed-window rate limiting keyed by caller identifier.
//!
//! Windows reset lazily on the first request after expiry. Counters are
//! in-memory and per-process; a horizontally scaled deployment would need
//! shared state, which this platform does not require at its current scale.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Requests allowed per key per window.
    pub max_requests: u32,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 120,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.window_secs),
            max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_requests),
            enabled: std::env::var("RATE_LIMIT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-key fixed-window counter. All access to the counters goes through
/// one lock since requests resolve concurrently.
pub struct FixedWindowLimiter {
    windows: RwLock<HashMap<String, Window>>,
    config: RateLimitConfig,
    cleanup_threshold: usize,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            config,
            cleanup_threshold: 10_000,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    fn window_duration(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Count one request against `key`. Returns false once the key has used
    /// up its window quota.
    pub async fn allow(&self, key: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let now = Instant::now();
        let window = self.window_duration();
        let mut windows = self.windows.write().await;

        if windows.len() > self.cleanup_threshold {
            windows.retain(|_, w| now.duration_since(w.started) < window);
            if windows.len() > self.cleanup_threshold {
                debug!("rate limiter key table still over threshold after sweep, clearing");
                windows.clear();
            }
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        // Lazy reset: the first request after expiry opens a fresh window.
        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            true
        } else {
            false
        }
    }

    /// Requests left in the key's current window.
    pub async fn remaining(&self, key: &str) -> u32 {
        if !self.config.enabled {
            return self.config.max_requests;
        }
        let windows = self.windows.read().await;
        match windows.get(key) {
            Some(w) if Instant::now().duration_since(w.started) < self.window_duration() => {
                self.config.max_requests.saturating_sub(w.count)
            }
            _ => self.config.max_requests,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
