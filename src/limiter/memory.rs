//! In-memory sliding-window limiter for local runs and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::RateLimiter;

/// Process-local sliding-window limiter
///
/// Same admission semantics as the Redis backend, without cross-process
/// sharing. Event timestamps are pruned lazily on each check.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<String, Vec<i64>>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admission check at an explicit timestamp (milliseconds). Extracted
    /// so tests can drive the clock deterministically.
    pub fn check_at(&self, key: &str, window_seconds: u64, max_requests: u32, now_ms: i64) -> bool {
        let window_key = format!("{key}:{window_seconds}");
        let cutoff = now_ms - (window_seconds as i64) * 1000;

        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let events = windows.entry(window_key).or_default();
        events.retain(|ts| *ts > cutoff);

        if events.len() >= max_requests as usize {
            return false;
        }

        events.push(now_ms);
        true
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn is_allowed(&self, key: &str, window_seconds: u64, max_requests: u32) -> bool {
        self.check_at(
            key,
            window_seconds,
            max_requests,
            chrono::Utc::now().timestamp_millis(),
        )
    }
}
