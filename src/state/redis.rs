//! Redis-backed polling state store
//!
//! One Redis hash per job key, under
//! `{prefix}:pollstate:{tenant}:{source}:{instance-digest}`. Every write
//! refreshes a rolling TTL so abandoned jobs expire on their own instead of
//! requiring explicit deletion.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::warn;

use super::{instance_digest, StateStore, DEFAULT_STATE_TTL_SECS};
use crate::error::Result;
use crate::models::PollingState;

const FIELD_LAST_SUCCESS: &str = "last_successful_poll";
const FIELD_LAST_ATTEMPT: &str = "last_poll_attempt";
const FIELD_FAILURES: &str = "consecutive_failures";
const FIELD_LAST_ERROR: &str = "last_error";
const FIELD_LAST_ERROR_AT: &str = "last_error_at";

/// Redis hash per job key with rolling TTL
pub struct RedisStateStore {
    pool: Pool,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisStateStore {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
            ttl_secs: DEFAULT_STATE_TTL_SECS,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs.max(1);
        self
    }

    fn state_key(&self, tenant_id: &str, source_type: &str, instance_url: &str) -> String {
        format!(
            "{}:pollstate:{}:{}:{}",
            self.key_prefix,
            tenant_id,
            source_type,
            instance_digest(instance_url)
        )
    }

    fn now_string() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    async fn read(&self, key: &str) -> Result<PollingState> {
        let mut conn = self.pool.get().await?;
        let fields: HashMap<String, String> = conn.hgetall(key).await?;

        Ok(PollingState {
            last_successful_poll: parse_timestamp(fields.get(FIELD_LAST_SUCCESS)),
            last_poll_attempt: parse_timestamp(fields.get(FIELD_LAST_ATTEMPT)),
            consecutive_failures: fields
                .get(FIELD_FAILURES)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_error: fields.get(FIELD_LAST_ERROR).cloned(),
            last_error_at: parse_timestamp(fields.get(FIELD_LAST_ERROR_AT)),
        })
    }

    async fn write_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(key, fields).ignore();
        pipe.expire(key, self.ttl_secs as i64).ignore();
        pipe.query_async::<()>(&mut *conn).await?;
        Ok(())
    }

    async fn clear_error_fields(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset(key, FIELD_FAILURES, 0).ignore();
        pipe.hdel(key, FIELD_LAST_ERROR).ignore();
        pipe.hdel(key, FIELD_LAST_ERROR_AT).ignore();
        pipe.expire(key, self.ttl_secs as i64).ignore();
        pipe.query_async::<()>(&mut *conn).await?;
        Ok(())
    }

    async fn increment_failures(&self, key: &str, error: &str) -> Result<u32> {
        let mut conn = self.pool.get().await?;
        let count: i64 = conn.hincr(key, FIELD_FAILURES, 1).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(
            key,
            &[
                (FIELD_LAST_ERROR, error.to_string()),
                (FIELD_LAST_ERROR_AT, Self::now_string()),
            ],
        )
        .ignore();
        pipe.expire(key, self.ttl_secs as i64).ignore();
        pipe.query_async::<()>(&mut *conn).await?;

        Ok(count.max(0) as u32)
    }
}

fn parse_timestamp(value: Option<&String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get_state(
        &self,
        tenant_id: &str,
        source_type: &str,
        instance_url: &str,
    ) -> PollingState {
        let key = self.state_key(tenant_id, source_type, instance_url);
        match self.read(&key).await {
            Ok(state) => state,
            Err(e) => {
                // Best-effort: an unreachable backend reads as a fresh job
                warn!(key = %key, error = %e, "State read failed, using default state");
                PollingState::default()
            }
        }
    }

    async fn record_attempt(&self, tenant_id: &str, source_type: &str, instance_url: &str) {
        let key = self.state_key(tenant_id, source_type, instance_url);
        if let Err(e) = self
            .write_fields(&key, &[(FIELD_LAST_ATTEMPT, Self::now_string())])
            .await
        {
            warn!(key = %key, error = %e, "Failed to record poll attempt");
        }
    }

    async fn record_success(&self, tenant_id: &str, source_type: &str, instance_url: &str) {
        let key = self.state_key(tenant_id, source_type, instance_url);
        let result = async {
            self.write_fields(&key, &[(FIELD_LAST_SUCCESS, Self::now_string())])
                .await?;
            self.clear_error_fields(&key).await
        }
        .await;

        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to record poll success");
        }
    }

    async fn record_failure(
        &self,
        tenant_id: &str,
        source_type: &str,
        instance_url: &str,
        error: &str,
        max_failures: u32,
    ) -> bool {
        let key = self.state_key(tenant_id, source_type, instance_url);
        match self.increment_failures(&key, error).await {
            Ok(count) => max_failures > 0 && count >= max_failures,
            Err(e) => {
                // Without the backend we cannot count; never disable blindly
                warn!(key = %key, error = %e, "Failed to record poll failure");
                false
            }
        }
    }

    async fn reset_failure_count(&self, tenant_id: &str, source_type: &str, instance_url: &str) {
        let key = self.state_key(tenant_id, source_type, instance_url);
        if let Err(e) = self.clear_error_fields(&key).await {
            warn!(key = %key, error = %e, "Failed to reset failure count");
        }
    }
}
