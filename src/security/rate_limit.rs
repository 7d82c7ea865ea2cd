//! Fixed-window rate limiting keyed by (user, service).
//!
//! A window of `window_sec` seconds is aligned to the epoch
//! (`floor(now / window) * window`). Each key keeps the start of the window it
//! last counted in; a different start resets the count. Bursts of up to
//! `2 * max` across a window boundary are accepted.

use dashmap::DashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Counter key: one bucket per user per service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub user_id: String,
    pub service_id: String,
}

impl RateLimitKey {
    pub fn new(user_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            service_id: service_id.into(),
        }
    }
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window ends.
    pub reset_at_ms: u64,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, never less than 1.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        let wait_ms = self.reset_at_ms.saturating_sub(now_ms);
        wait_ms.div_ceil(1000).max(1)
    }
}

#[derive(Debug)]
struct WindowCounter {
    window_start_ms: u64,
    count: u64,
}

/// Process-local counters. Not persisted; a restart forgets all windows.
#[derive(Debug, Default)]
pub struct RateLimiter {
    counters: DashMap<RateLimitKey, WindowCounter>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key` against `max` per `window_sec`.
    pub fn check(&self, key: &RateLimitKey, window_sec: u32, max: u32) -> RateLimitDecision {
        self.check_at(key, window_sec, max, now_ms())
    }

    /// Same as [`check`](Self::check) at an explicit time.
    pub fn check_at(
        &self,
        key: &RateLimitKey,
        window_sec: u32,
        max: u32,
        now_ms: u64,
    ) -> RateLimitDecision {
        let window_ms = u64::from(window_sec.max(1)) * 1000;
        let window_start_ms = (now_ms / window_ms) * window_ms;

        // The RefMut holds the shard write lock until the end of this scope,
        // so reset + increment is atomic per key.
        let mut counter = match self.counters.get_mut(key) {
            Some(counter) => counter,
            None => self.counters.entry(key.clone()).or_insert(WindowCounter {
                window_start_ms,
                count: 0,
            }),
        };
        if counter.window_start_ms != window_start_ms {
            counter.window_start_ms = window_start_ms;
            counter.count = 0;
        }
        counter.count += 1;
        let count = counter.count;
        drop(counter);

        let max_count = u64::from(max);
        RateLimitDecision {
            allowed: count <= max_count,
            limit: max,
            remaining: max_count.saturating_sub(count) as u32,
            reset_at_ms: window_start_ms + window_ms,
        }
    }

    /// Number of keys with a live counter.
    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
