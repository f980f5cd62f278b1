//! Redis-backed distributed sliding-window limiter

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::Script;
use tracing::warn;
use uuid::Uuid;

use super::RateLimiter;

/// Multiplier applied to the window size for key expiry, so idle windows
/// clean themselves up
pub const DEFAULT_CLEANUP_TTL_MULTIPLIER: u64 = 2;

/// Single round-trip check-and-record: evict events older than the window,
/// deny at capacity, otherwise record the new event and refresh expiry.
const SLIDING_WINDOW_SCRIPT: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, ARGV[1])
local count = redis.call('ZCARD', KEYS[1])
if count >= tonumber(ARGV[2]) then
    return 0
end
redis.call('ZADD', KEYS[1], ARGV[3], ARGV[4])
redis.call('EXPIRE', KEYS[1], ARGV[5])
return 1
";

/// Sliding-window limiter over a Redis sorted set per `key:window`
pub struct RedisRateLimiter {
    pool: Pool,
    key_prefix: String,
    ttl_multiplier: u64,
    script: Script,
}

impl RedisRateLimiter {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
            ttl_multiplier: DEFAULT_CLEANUP_TTL_MULTIPLIER,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }

    pub fn with_ttl_multiplier(mut self, multiplier: u64) -> Self {
        self.ttl_multiplier = multiplier.max(1);
        self
    }

    fn window_key(&self, key: &str, window_seconds: u64) -> String {
        format!("{}:ratelimit:{}:{}", self.key_prefix, key, window_seconds)
    }

    async fn check(
        &self,
        key: &str,
        window_seconds: u64,
        max_requests: u32,
    ) -> crate::error::Result<bool> {
        let mut conn = self.pool.get().await?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let cutoff = now_ms - (window_seconds as i64) * 1000;
        // Member must be unique even when two events share a millisecond
        let member = format!("{now_ms}-{}", Uuid::new_v4().simple());

        let allowed: i64 = self
            .script
            .key(self.window_key(key, window_seconds))
            .arg(cutoff)
            .arg(max_requests)
            .arg(now_ms)
            .arg(member)
            .arg(window_seconds * self.ttl_multiplier)
            .invoke_async(&mut *conn)
            .await?;

        Ok(allowed == 1)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn is_allowed(&self, key: &str, window_seconds: u64, max_requests: u32) -> bool {
        match self.check(key, window_seconds, max_requests).await {
            Ok(allowed) => allowed,
            Err(e) => {
                // Fail open: a Redis outage must not halt all polling
                warn!(
                    key = %key,
                    window_seconds = window_seconds,
                    error = %e,
                    "Rate limiter backend unavailable, allowing request"
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool_redis::{Config as PoolConfig, Runtime};

    fn test_pool(url: &str) -> Pool {
        PoolConfig::from_url(url)
            .builder()
            .unwrap()
            .max_size(2)
            .runtime(Runtime::Tokio1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fails_open_when_backend_unreachable() {
        // Nothing listens on this port; every check must still allow
        let limiter = RedisRateLimiter::new(test_pool("redis://127.0.0.1:1"), "inflow-test");

        for _ in 0..10 {
            assert!(limiter.is_allowed("acme:rest:api_calls", 60, 1).await);
        }
    }

    // Integration tests require running Redis
    #[tokio::test]
    #[ignore = "Requires running Redis"]
    async fn test_sliding_window_against_redis() {
        let limiter = RedisRateLimiter::new(
            test_pool("redis://localhost:6379"),
            format!("inflow-test-{}", Uuid::new_v4().simple()),
        );

        for _ in 0..3 {
            assert!(limiter.is_allowed("k", 60, 3).await);
        }
        assert!(!limiter.is_allowed("k", 60, 3).await);

        // A different window for the same key counts separately
        assert!(limiter.is_allowed("k", 3600, 10).await);
    }
}
