//! Fixed-window request limiting, keyed by client

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Milliseconds until the window resets
    pub reset_ms: u64,
}

impl RateLimitDecision {
    /// Whole seconds to wait before retrying, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_ms.div_ceil(1000)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_ms: u64,
    count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key` against `limit` requests per `window`
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateLimitDecision {
        self.check_at(key, limit, window, now_ms())
    }

    pub fn check_at(&self, key: &str, limit: u32, window: Duration, now_ms: u64) -> RateLimitDecision {
        let window_ms = window.as_millis() as u64;
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started_ms: now_ms,
            count: 0,
        });

        if now_ms.saturating_sub(entry.started_ms) >= window_ms {
            entry.started_ms = now_ms;
            entry.count = 0;
        }

        let reset_ms = (entry.started_ms + window_ms).saturating_sub(now_ms);
        if entry.count >= limit {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_ms,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: limit - entry.count,
            reset_ms,
        }
    }

    /// Drop windows that ended before `now_ms`
    pub fn prune(&self, window: Duration, now_ms: u64) {
        let window_ms = window.as_millis() as u64;
        self.windows
            .retain(|_, w| now_ms.saturating_sub(w.started_ms) < window_ms);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Prune expired windows once per `window` until the handle is aborted
    pub fn spawn_pruner(&self, window: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window);
            loop {
                ticker.tick().await;
                limiter.prune(window, now_ms());
                tracing::trace!(clients = limiter.tracked_keys(), "rate limit windows pruned");
            }
        })
    }
}
