//! In-memory publisher for local runs and tests

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use super::Publisher;
use crate::error::{Error, Result};
use crate::models::JobConfig;

/// One captured publish call
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub payload: Value,
    pub job_key: String,
    pub correlation_id: String,
}

/// Collects published records instead of sending them anywhere.
///
/// `fail_next` lets tests exercise the publish-failure path (a failed
/// publish counts as a cycle failure).
#[derive(Default)]
pub struct MemoryPublisher {
    records: Mutex<Vec<PublishedRecord>>,
    fail_next: Mutex<bool>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn published(&self) -> Vec<PublishedRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Make the next publish call fail
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        record: &Value,
        config: &JobConfig,
        correlation_id: &str,
    ) -> Result<()> {
        {
            let mut fail = self.fail_next.lock().unwrap_or_else(|p| p.into_inner());
            if *fail {
                *fail = false;
                return Err(Error::other("simulated publish failure"));
            }
        }

        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.push(PublishedRecord {
            payload: record.clone(),
            job_key: config.job_key(),
            correlation_id: correlation_id.to_string(),
        });
        Ok(())
    }
}
