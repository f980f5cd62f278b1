//! Redis Streams publisher
//!
//! Appends one entry per record to a single stream; downstream consumers
//! read with consumer groups. The payload travels as serialized JSON next
//! to flat routing fields so consumers can filter without parsing it.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde_json::Value;

use super::Publisher;
use crate::error::Result;
use crate::models::JobConfig;

/// Default stream name for ingested records
pub const DEFAULT_STREAM: &str = "inflow:ingest";

/// Publisher appending to one Redis stream
pub struct RedisStreamPublisher {
    pool: Pool,
    stream: String,
}

impl RedisStreamPublisher {
    pub fn new(pool: Pool, stream: impl Into<String>) -> Self {
        Self {
            pool,
            stream: stream.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

#[async_trait]
impl Publisher for RedisStreamPublisher {
    async fn publish(
        &self,
        record: &Value,
        config: &JobConfig,
        correlation_id: &str,
    ) -> Result<()> {
        let payload = serde_json::to_string(record)?;

        let mut fields: Vec<(&str, String)> = vec![
            ("payload", payload),
            ("tenant_id", config.tenant_id.clone()),
            ("source_type", config.source_type.clone()),
            ("instance_url", config.instance_url.clone()),
            ("correlation_id", correlation_id.to_string()),
            (
                "fetched_at",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ];
        if let Some(credential_ref) = &config.credential_ref {
            fields.push(("credential_ref", credential_ref.clone()));
        }

        let mut conn = self.pool.get().await?;
        let _id: String = conn.xadd(&self.stream, "*", &fields).await?;

        Ok(())
    }
}
