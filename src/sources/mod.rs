//! Read-only access to the set of enabled job configurations
//!
//! The scheduler never authors configuration; it only reads whatever is
//! currently enabled. The production source is a Postgres table; the static
//! source serves local runs and tests. A transient listing failure is a
//! skip-this-cycle condition for the scheduler, never fatal.

mod postgres;

pub use postgres::PostgresConfigSource;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::JobConfig;

/// Source of currently enabled job configurations
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// List every enabled job configuration
    async fn list_enabled_configs(&self) -> Result<Vec<JobConfig>>;
}

/// Fixed in-memory configuration source for local runs and tests
#[derive(Default)]
pub struct StaticConfigSource {
    configs: RwLock<Vec<JobConfig>>,
}

impl StaticConfigSource {
    pub fn new(configs: Vec<JobConfig>) -> Self {
        Self {
            configs: RwLock::new(configs),
        }
    }

    /// Replace the config set (tests use this to simulate config changes
    /// between reconciliations)
    pub async fn set(&self, configs: Vec<JobConfig>) {
        *self.configs.write().await = configs;
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn list_enabled_configs(&self) -> Result<Vec<JobConfig>> {
        Ok(self
            .configs
            .read()
            .await
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }
}
