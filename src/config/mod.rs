//! Configuration management for the inflow poller
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Redis configuration (rate limiting, poll state, publishing)
    pub redis: RedisConfig,

    /// Database configuration (job configs)
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between reconciliations of running jobs against stored configs
    pub reconcile_interval_secs: u64,

    /// Floor applied to per-job polling intervals, in seconds
    pub min_poll_interval_secs: u64,

    /// Request timeout for source API calls, in seconds
    pub request_timeout_secs: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,

    /// Prefix applied to every key this service writes
    pub key_prefix: String,

    /// Stream receiving fetched records
    pub publish_stream: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,

    /// Maximum pool size
    pub pool_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let reconcile_interval_secs = std::env::var("INFLOW_RECONCILE_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let min_poll_interval_secs = std::env::var("INFLOW_MIN_POLL_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let request_timeout_secs = std::env::var("INFLOW_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| String::from("redis://localhost:6379"));

        let redis_pool_size = std::env::var("INFLOW_REDIS_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(16);

        let key_prefix =
            std::env::var("INFLOW_KEY_PREFIX").unwrap_or_else(|_| String::from("inflow"));

        let publish_stream =
            std::env::var("INFLOW_PUBLISH_STREAM").unwrap_or_else(|_| String::from("inflow:ingest"));

        let postgres_url = std::env::var("POSTGRES_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| String::from("postgresql://localhost/inflow"));

        let log_level = std::env::var("INFLOW_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("INFLOW_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            scheduler: SchedulerConfig {
                reconcile_interval_secs,
                min_poll_interval_secs,
                request_timeout_secs,
            },
            redis: RedisConfig {
                url: redis_url,
                pool_size: redis_pool_size,
                key_prefix,
                publish_stream,
            },
            database: DatabaseConfig {
                postgres_url,
                pool_size: 10,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.reconcile_interval_secs == 0 {
            anyhow::bail!("reconcile_interval_secs must be greater than 0");
        }

        if self.scheduler.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.redis.pool_size == 0 || self.database.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }

        if self.redis.key_prefix.is_empty() {
            anyhow::bail!("key_prefix must not be empty");
        }

        if self.redis.publish_stream.is_empty() {
            anyhow::bail!("publish_stream must not be empty");
        }

        Ok(())
    }

    /// Get reconcile interval as Duration
    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.reconcile_interval_secs)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig {
                reconcile_interval_secs: 30,
                min_poll_interval_secs: 30,
                request_timeout_secs: 30,
            },
            redis: RedisConfig {
                url: String::from("redis://localhost:6379"),
                pool_size: 16,
                key_prefix: String::from("inflow"),
                publish_stream: String::from("inflow:ingest"),
            },
            database: DatabaseConfig {
                postgres_url: String::from("postgresql://localhost/inflow"),
                pool_size: 10,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
