//! Handing fetched records to the downstream pipeline
//!
//! The scheduler publishes each raw record together with enough job context
//! (tenant, source type, instance URL, optional credential reference) for
//! downstream transformation, tagged with the cycle's correlation id.
//! Delivery is at-least-once from the scheduler's perspective: a publish
//! failure propagates as a cycle failure and the cycle is retried on a
//! later tick.

mod memory;
mod redis;

pub use memory::{MemoryPublisher, PublishedRecord};
pub use redis::RedisStreamPublisher;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::JobConfig;

/// Message-bus producer for fetched records
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        record: &Value,
        config: &JobConfig,
        correlation_id: &str,
    ) -> Result<()>;
}
