use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

use crate::error::ApiError;

const PRUNE_THRESHOLD: usize = 1024;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window attempt counter keyed by client identity.
///
/// Best-effort: counters live in process memory and reset on restart. Shared
/// across request tasks behind a single mutex; the critical section is a map
/// lookup plus an increment.
pub struct RateLimiter {
    window: Duration,
    max_attempts: u32,
    buckets: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_attempts: u32) -> Self {
        Self {
            window,
            max_attempts,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Count one attempt for `key`, rejecting once the window's budget is spent.
    pub fn check(&self, key: &str) -> Result<(), ApiError> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), ApiError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        if buckets.len() > PRUNE_THRESHOLD {
            let window = self.window;
            buckets.retain(|_, w| now.duration_since(w.started) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(bucket.started) >= self.window {
            bucket.started = now;
            bucket.count = 0;
        }
        bucket.count += 1;

        if bucket.count > self.max_attempts {
            tracing::warn!(%key, count = bucket.count, "rate limit exceeded");
            return Err(ApiError::RateLimitExceeded);
        }
        Ok(())
    }
}

/// Client key used for rate limiting: first hop of `x-forwarded-for`, then
/// `x-real-ip`, falling back to a shared bucket when neither is present.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
