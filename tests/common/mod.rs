//! Common test utilities

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use inflow::error::Result;
use inflow::models::{ApiConfig, ExtractionConfig, FetchOutcome, JobConfig};
use inflow::poller::{FetchError, SourceBehavior};
use inflow::sources::{ConfigSource, StaticConfigSource};

/// Create a job config pointing at the given endpoint
pub fn job_config(endpoint: &str) -> JobConfig {
    JobConfig {
        tenant_id: "acme".to_string(),
        source_type: "rest".to_string(),
        instance_url: "https://api.example.com".to_string(),
        api: ApiConfig {
            endpoint: endpoint.to_string(),
            method: Default::default(),
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            body: None,
            auth: Default::default(),
        },
        extraction: ExtractionConfig::default(),
        interval_seconds: 1,
        enabled: true,
        max_failures_before_disable: 5,
        requests_per_minute: 1000,
        requests_per_hour: 10000,
        credential_ref: None,
    }
}

/// Config with a distinct identity tuple
#[allow(dead_code)]
pub fn job_config_for(tenant: &str, source_type: &str, instance_url: &str) -> JobConfig {
    let mut config = job_config("https://api.example.com/v1/feedback");
    config.tenant_id = tenant.to_string();
    config.source_type = source_type.to_string();
    config.instance_url = instance_url.to_string();
    config
}

/// Scripted behavior for scheduler tests: returns fixed records, can fail
/// for selected instance URLs, and can simulate slow fetches
#[allow(dead_code)]
pub struct StubBehavior {
    pub records: Vec<Value>,
    pub fail_for: Option<String>,
    pub delay: Duration,
    pub calls: AtomicU32,
}

#[allow(dead_code)]
impl StubBehavior {
    pub fn returning(records: Vec<Value>) -> Self {
        Self {
            records,
            fail_for: None,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_for(instance_url: &str) -> Self {
        Self {
            records: vec![json!({"id": 1})],
            fail_for: Some(instance_url.to_string()),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn slow(records: Vec<Value>, delay: Duration) -> Self {
        Self {
            records,
            fail_for: None,
            delay,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceBehavior for StubBehavior {
    fn can_handle(&self, _source_type: &str) -> bool {
        true
    }

    fn display_name(&self) -> &'static str {
        "stub"
    }

    async fn fetch(
        &self,
        config: &JobConfig,
        _since: Option<DateTime<Utc>>,
        _correlation_id: &str,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(failing) = &self.fail_for {
            if config.instance_url.contains(failing.as_str()) {
                return Err(FetchError::ServerError(500));
            }
        }

        Ok(FetchOutcome {
            records: self.records.clone(),
            pages_processed: 1,
            has_more: false,
        })
    }
}

/// Config source that can be flipped into a failing state mid-test
#[allow(dead_code)]
pub struct FlakyConfigSource {
    inner: StaticConfigSource,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl FlakyConfigSource {
    pub fn new(configs: Vec<JobConfig>) -> Self {
        Self {
            inner: StaticConfigSource::new(configs),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigSource for FlakyConfigSource {
    async fn list_enabled_configs(&self) -> Result<Vec<JobConfig>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(inflow::error::Error::PostgresPool(
                "connection refused".to_string(),
            ));
        }
        self.inner.list_enabled_configs().await
    }
}
