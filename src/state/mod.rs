//! Persisted per-job polling state (the circuit breaker's memory)
//!
//! Each job key owns a small record: last successful poll, last attempt,
//! consecutive failure count, and the last error. It survives process
//! restarts so incremental polling and circuit breaking behave correctly
//! across deploys. Backend errors are best-effort by policy: reads fall
//! back to the default empty state and writes are logged, so a storage
//! outage degrades bookkeeping instead of stopping polling.

mod memory;
mod redis;

pub use memory::MemoryStateStore;
pub use redis::RedisStateStore;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::PollingState;

/// Default rolling TTL refreshed on every write
pub const DEFAULT_STATE_TTL_SECS: u64 = 30 * 24 * 3600;

/// Short digest of an instance URL, used to bound physical key length.
///
/// 16 hex chars (64 bits) keep accidental collisions across distinct
/// instance URLs for the same tenant/source astronomically unlikely; jobs
/// with colliding digests would share breaker state.
pub fn instance_digest(instance_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(instance_url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Persisted polling-state operations, keyed by (tenant, source, instance)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the job's state, defaulting to an empty record when absent or
    /// when the backend is unreachable
    async fn get_state(&self, tenant_id: &str, source_type: &str, instance_url: &str)
        -> PollingState;

    /// Record that a poll attempt started now
    async fn record_attempt(&self, tenant_id: &str, source_type: &str, instance_url: &str);

    /// Record a successful poll: sets the last-success timestamp, zeroes
    /// the failure count, clears the stored error
    async fn record_success(&self, tenant_id: &str, source_type: &str, instance_url: &str);

    /// Record a failed poll. Returns true once the consecutive failure
    /// count has reached `max_failures` (the job should be disabled).
    async fn record_failure(
        &self,
        tenant_id: &str,
        source_type: &str,
        instance_url: &str,
        error: &str,
        max_failures: u32,
    ) -> bool;

    /// Pure read: whether the failure threshold has been reached
    async fn should_disable(
        &self,
        tenant_id: &str,
        source_type: &str,
        instance_url: &str,
        max_failures: u32,
    ) -> bool {
        self.get_state(tenant_id, source_type, instance_url)
            .await
            .is_disabled(max_failures)
    }

    /// Administrative override: zero the failure count so a disabled job
    /// is picked up again at the next reconciliation
    async fn reset_failure_count(&self, tenant_id: &str, source_type: &str, instance_url: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_digest_stable_and_short() {
        let a = instance_digest("https://api.example.com");
        let b = instance_digest("https://api.example.com");
        let c = instance_digest("https://api.example.com/other");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
