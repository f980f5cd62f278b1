//! Postgres-backed job configuration source
//!
//! Reads enabled rows from the `poll_configs` table. The `api` and
//! `extraction` columns are JSONB and deserialize into the corresponding
//! model types; a row that fails to parse is logged and skipped so one bad
//! row cannot take down every other job.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::warn;

use super::ConfigSource;
use crate::error::Result;
use crate::models::{ApiConfig, ExtractionConfig, JobConfig};

const LIST_ENABLED_QUERY: &str = "\
SELECT tenant_id, source_type, instance_url, api, extraction, \
       interval_seconds, max_failures_before_disable, \
       requests_per_minute, requests_per_hour, credential_ref \
FROM poll_configs \
WHERE enabled = TRUE";

/// Configuration source over a Postgres connection pool
pub struct PostgresConfigSource {
    pool: Pool,
}

impl PostgresConfigSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &Row) -> Result<JobConfig> {
        let api: serde_json::Value = row.try_get("api")?;
        let extraction: Option<serde_json::Value> = row.try_get("extraction")?;

        let api: ApiConfig = serde_json::from_value(api)?;
        let extraction: ExtractionConfig = match extraction {
            Some(value) => serde_json::from_value(value)?,
            None => ExtractionConfig::default(),
        };

        let interval_seconds: i64 = row.try_get::<_, i32>("interval_seconds")?.into();
        let max_failures: i32 = row.try_get("max_failures_before_disable")?;
        let per_minute: i32 = row.try_get("requests_per_minute")?;
        let per_hour: i32 = row.try_get("requests_per_hour")?;

        Ok(JobConfig {
            tenant_id: row.try_get("tenant_id")?,
            source_type: row.try_get("source_type")?,
            instance_url: row.try_get("instance_url")?,
            api,
            extraction,
            interval_seconds: interval_seconds.max(0) as u64,
            enabled: true,
            max_failures_before_disable: max_failures.max(0) as u32,
            requests_per_minute: per_minute.max(0) as u32,
            requests_per_hour: per_hour.max(0) as u32,
            credential_ref: row.try_get("credential_ref")?,
        })
    }
}

#[async_trait]
impl ConfigSource for PostgresConfigSource {
    async fn list_enabled_configs(&self) -> Result<Vec<JobConfig>> {
        let client = self.pool.get().await?;
        let rows = client.query(LIST_ENABLED_QUERY, &[]).await?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::parse_row(row) {
                Ok(config) => configs.push(config),
                Err(e) => {
                    let tenant: String = row.try_get("tenant_id").unwrap_or_default();
                    warn!(tenant_id = %tenant, error = %e, "Skipping unparseable poll config row");
                }
            }
        }

        Ok(configs)
    }
}
