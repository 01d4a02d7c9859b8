//! In-memory fixed-window rate limiter.
//!
//! One window per key. Memory is bounded two ways: expired windows are purged
//! every `cleanup_interval` calls, and at most `max_tracked_keys` keys are
//! tracked at once. A new key arriving at the cap forces a purge; if the map is
//! still full the attempt is refused.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bastion_core::{ClockSource, SystemClock};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::traits::RateLimiter;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Purge expired windows every N calls.
    pub cleanup_interval: u64,
    /// Hard cap on distinct keys.
    pub max_tracked_keys: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: 100,
            max_tracked_keys: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_ms: u64,
    window_ms: u64,
    count: u32,
}

impl Window {
    fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_ms) >= self.window_ms
    }
}

pub struct InMemoryRateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn ClockSource>,
    windows: DashMap<String, Window>,
    calls: AtomicU64,
}

impl InMemoryRateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            config,
            clock,
            windows: DashMap::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Synchronous form of [`RateLimiter::check_and_increment`].
    ///
    /// A zero window is refused rather than treated as always expired.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> bool {
        let now = self.clock.now();
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        if window_ms == 0 {
            warn!(key, "zero-length rate limit window; denying");
            return false;
        }

        let calls = self.calls.fetch_add(1, Ordering::Relaxed);
        let interval = self.config.cleanup_interval;
        if interval > 0 && calls > 0 && calls % interval == 0 {
            debug!(calls, "running periodic rate limiter cleanup");
            self.purge_expired(now);
        }

        if !self.windows.contains_key(key) && self.windows.len() >= self.config.max_tracked_keys {
            self.purge_expired(now);
            if self.windows.len() >= self.config.max_tracked_keys {
                warn!(
                    key,
                    max_tracked_keys = self.config.max_tracked_keys,
                    "rate limiter key capacity reached"
                );
                return false;
            }
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started_ms: now,
            window_ms,
            count: 0,
        });
        if entry.expired(now) {
            *entry = Window {
                started_ms: now,
                window_ms,
                count: 0,
            };
        }
        if entry.count >= limit {
            debug!(key, limit, "rate limit exceeded");
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drop every window that has fully elapsed.
    pub fn purge_expired(&self, now_ms: u64) {
        self.windows.retain(|_, window| !window.expired(now_ms));
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_increment(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.check(key, limit, window)
    }
}
