//! Distributed sliding-window rate limiting
//!
//! Admission control shared across all jobs and processes polling the same
//! tenant/source. The production backend keeps a Redis sorted set of event
//! timestamps per `key:window`; the in-memory backend serves local runs and
//! tests. Backend unavailability fails OPEN (the check allows) so a Redis
//! outage degrades rate-limit strictness instead of silently halting all
//! polling.

mod memory;
mod redis;

pub use memory::MemoryRateLimiter;
pub use redis::RedisRateLimiter;

use async_trait::async_trait;

/// Sliding-window admission check
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Returns true when another request is admitted for `key` within the
    /// trailing `window_seconds`. An admitted request is recorded as part
    /// of the same check.
    async fn is_allowed(&self, key: &str, window_seconds: u64, max_requests: u32) -> bool;
}
