//! Core data structures shared across the polling pipeline
//!
//! The central type is [`JobConfig`]: one row of polling configuration
//! describing how to fetch records for a single (tenant, source type,
//! instance URL) tuple. Everything here is serde-friendly because configs
//! live as JSONB columns in Postgres and state lives as Redis hashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// HTTP method for a polled endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Authentication scheme attached to outbound requests
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication
    #[default]
    None,

    /// `Authorization: Bearer <token>`
    Bearer { token: String },

    /// HTTP basic auth from username/password
    Basic { username: String, password: String },

    /// A named header carrying a raw API key value
    ApiKey { header: String, value: String },
}

/// Declarative description of the remote API endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Full endpoint URL to poll
    pub endpoint: String,

    /// HTTP method (GET or POST)
    #[serde(default)]
    pub method: HttpMethod,

    /// Extra headers merged into every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Declared query parameters (pagination params take precedence on
    /// conflicting keys)
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,

    /// Verbatim request body for POST endpoints
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Authentication descriptor
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Pagination style for the generic paginated-REST client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    /// Opaque cursor extracted from each response
    Cursor,
    /// Incrementing page number
    Page,
    /// Offset/limit windowing
    Offset,
}

/// Pagination descriptor: which style to use and the parameter names the
/// remote API expects. Unset names fall back to conventional defaults
/// (`cursor`, `page`/`per_page`, `offset`/`limit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub kind: PaginationKind,

    /// Response path selecting the next cursor value (cursor style)
    #[serde(default)]
    pub cursor_path: Option<String>,

    /// Query parameter carrying the cursor (default: `cursor`)
    #[serde(default)]
    pub cursor_param: Option<String>,

    /// Query parameter carrying the page number (default: `page`)
    #[serde(default)]
    pub page_param: Option<String>,

    /// Query parameter carrying the page size (default: `per_page`)
    #[serde(default)]
    pub page_size_param: Option<String>,

    /// Page number to start from (default: 1)
    #[serde(default)]
    pub start_page: Option<u64>,

    /// Query parameter carrying the offset (default: `offset`)
    #[serde(default)]
    pub offset_param: Option<String>,

    /// Query parameter carrying the limit (default: `limit`)
    #[serde(default)]
    pub limit_param: Option<String>,

    /// Page size / limit value (default: 50)
    #[serde(default)]
    pub page_size: Option<u64>,
}

impl PaginationConfig {
    /// Default page size when the config does not set one
    pub const DEFAULT_PAGE_SIZE: u64 = 50;

    /// Minimal descriptor for the given style, all parameter names defaulted
    pub fn of_kind(kind: PaginationKind) -> Self {
        Self {
            kind,
            cursor_path: None,
            cursor_param: None,
            page_param: None,
            page_size_param: None,
            start_page: None,
            offset_param: None,
            limit_param: None,
            page_size: None,
        }
    }

    pub fn cursor_param(&self) -> &str {
        self.cursor_param.as_deref().unwrap_or("cursor")
    }

    pub fn page_param(&self) -> &str {
        self.page_param.as_deref().unwrap_or("page")
    }

    pub fn page_size_param(&self) -> &str {
        self.page_size_param.as_deref().unwrap_or("per_page")
    }

    pub fn offset_param(&self) -> &str {
        self.offset_param.as_deref().unwrap_or("offset")
    }

    pub fn limit_param(&self) -> &str {
        self.limit_param.as_deref().unwrap_or("limit")
    }

    pub fn start_page(&self) -> u64 {
        self.start_page.unwrap_or(1)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size.unwrap_or(Self::DEFAULT_PAGE_SIZE)
    }
}

/// How to pull records out of a raw response and advance to the next page
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Response path selecting the record list (whole body when unset)
    #[serde(default)]
    pub response_path: Option<String>,

    /// Pagination descriptor (single-page endpoint when unset)
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,
}

/// One polling job's configuration, immutable per reconciliation cycle
///
/// Identity is the (tenant_id, source_type, instance_url) tuple; everything
/// else describes how and how often to fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub tenant_id: String,
    pub source_type: String,
    pub instance_url: String,

    /// Remote API description
    pub api: ApiConfig,

    /// Record extraction and pagination description
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Polling interval in seconds (a minimum floor is enforced at
    /// scheduling time)
    pub interval_seconds: u64,

    /// Whether this job should run at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Consecutive failures before the circuit breaker disables the job
    #[serde(default = "default_max_failures")]
    pub max_failures_before_disable: u32,

    /// Rate limit: requests per trailing minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Rate limit: requests per trailing hour
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,

    /// Opaque credential reference handed to downstream consumers
    #[serde(default)]
    pub credential_ref: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_failures() -> u32 {
    5
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_requests_per_hour() -> u32 {
    1000
}

impl JobConfig {
    /// Logical job key: `tenant_id:source_type:instance_url`
    pub fn job_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.tenant_id, self.source_type, self.instance_url
        )
    }

    /// Rate-limit key shared by all jobs of the same tenant/source
    pub fn rate_limit_key(&self) -> String {
        format!("{}:{}:api_calls", self.tenant_id, self.source_type)
    }

    /// Whether a live job running with `self` must be restarted to pick up
    /// `other`. Compares a fixed field set (interval, endpoint, method,
    /// query params, body, extraction description) rather than full deep
    /// equality, so cosmetic changes do not churn running jobs.
    pub fn requires_restart(&self, other: &JobConfig) -> bool {
        self.interval_seconds != other.interval_seconds
            || self.api.endpoint != other.api.endpoint
            || self.api.method != other.api.method
            || self.api.query_params != other.api.query_params
            || self.api.body != other.api.body
            || self.extraction != other.extraction
    }

    /// Polling interval clamped to the configured floor
    pub fn effective_interval(&self, floor_seconds: u64) -> Duration {
        Duration::from_secs(self.interval_seconds.max(floor_seconds))
    }
}

/// Persisted per-job polling state backing the circuit breaker and
/// incremental "since last success" polling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollingState {
    pub last_successful_poll: Option<DateTime<Utc>>,
    pub last_poll_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl PollingState {
    /// Whether the failure threshold has been reached
    pub fn is_disabled(&self, max_failures: u32) -> bool {
        max_failures > 0 && self.consecutive_failures >= max_failures
    }
}

/// Result of one fetch cycle produced by a source behavior
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Raw records, in the order the source returned them
    pub records: Vec<serde_json::Value>,

    /// Pages (or search pages) processed this cycle
    pub pages_processed: u32,

    /// Whether the source reported more data beyond this cycle's caps
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_config() -> JobConfig {
        JobConfig {
            tenant_id: "acme".to_string(),
            source_type: "rest".to_string(),
            instance_url: "https://api.example.com".to_string(),
            api: ApiConfig {
                endpoint: "https://api.example.com/v1/feedback".to_string(),
                method: HttpMethod::Get,
                headers: BTreeMap::new(),
                query_params: BTreeMap::new(),
                body: None,
                auth: AuthConfig::None,
            },
            extraction: ExtractionConfig::default(),
            interval_seconds: 300,
            enabled: true,
            max_failures_before_disable: 5,
            requests_per_minute: 60,
            requests_per_hour: 1000,
            credential_ref: None,
        }
    }

    #[test]
    fn test_job_key_format() {
        let config = sample_config();
        assert_eq!(config.job_key(), "acme:rest:https://api.example.com");
        assert_eq!(config.rate_limit_key(), "acme:rest:api_calls");
    }

    #[test]
    fn test_requires_restart_on_comparison_fields() {
        let base = sample_config();

        let mut changed = base.clone();
        changed.interval_seconds = 600;
        assert!(base.requires_restart(&changed));

        let mut changed = base.clone();
        changed.api.endpoint = "https://api.example.com/v2/feedback".to_string();
        assert!(base.requires_restart(&changed));

        let mut changed = base.clone();
        changed
            .api
            .query_params
            .insert("status".to_string(), "open".to_string());
        assert!(base.requires_restart(&changed));

        let mut changed = base.clone();
        changed.extraction.response_path = Some("data.items".to_string());
        assert!(base.requires_restart(&changed));
    }

    #[test]
    fn test_requires_restart_ignores_non_comparison_fields() {
        let base = sample_config();

        // Auth rotation and threshold tweaks do not restart a running job
        let mut changed = base.clone();
        changed.api.auth = AuthConfig::Bearer {
            token: "rotated".to_string(),
        };
        changed.max_failures_before_disable = 3;
        changed.requests_per_minute = 10;
        assert!(!base.requires_restart(&changed));
    }

    #[test]
    fn test_effective_interval_enforces_floor() {
        let mut config = sample_config();
        config.interval_seconds = 5;
        assert_eq!(config.effective_interval(30), Duration::from_secs(30));

        config.interval_seconds = 300;
        assert_eq!(config.effective_interval(30), Duration::from_secs(300));
    }

    #[test]
    fn test_auth_config_deserialization() {
        let bearer: AuthConfig =
            serde_json::from_value(json!({"type": "bearer", "token": "t0k"})).unwrap();
        assert_eq!(
            bearer,
            AuthConfig::Bearer {
                token: "t0k".to_string()
            }
        );

        let key: AuthConfig = serde_json::from_value(
            json!({"type": "api_key", "header": "X-Api-Key", "value": "secret"}),
        )
        .unwrap();
        assert!(matches!(key, AuthConfig::ApiKey { .. }));
    }

    #[test]
    fn test_job_config_deserialization_defaults() {
        let config: JobConfig = serde_json::from_value(json!({
            "tenant_id": "acme",
            "source_type": "rest",
            "instance_url": "https://api.example.com",
            "api": {"endpoint": "https://api.example.com/v1/feedback"},
            "interval_seconds": 120
        }))
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.max_failures_before_disable, 5);
        assert_eq!(config.api.method, HttpMethod::Get);
        assert!(config.extraction.response_path.is_none());
    }

    #[test]
    fn test_pagination_defaults() {
        let pagination = PaginationConfig::of_kind(PaginationKind::Page);

        assert_eq!(pagination.page_param(), "page");
        assert_eq!(pagination.page_size_param(), "per_page");
        assert_eq!(pagination.start_page(), 1);
        assert_eq!(pagination.page_size(), 50);
    }

    #[test]
    fn test_polling_state_disabled() {
        let mut state = PollingState::default();
        assert!(!state.is_disabled(3));

        state.consecutive_failures = 3;
        assert!(state.is_disabled(3));
        assert!(!state.is_disabled(0)); // zero threshold never disables
    }
}
