//! Generic paginated-REST fetch behavior
//!
//! The fallback behavior for any source type: drives a bounded pagination
//! loop over [`RequestBuilder`] and [`ResponseExtractor`], injecting an
//! incremental "since" parameter derived from the job's last successful
//! poll. One request error aborts the whole cycle; records from earlier
//! pages are discarded because publishing only happens after `fetch`
//! returns.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::behavior::SourceBehavior;
use super::error::FetchError;
use super::extract::ResponseExtractor;
use super::request::RequestBuilder;
use crate::models::{FetchOutcome, JobConfig};

/// Hard cap on pages fetched in one cycle
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// Fixed delay between successive page requests
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Parameter names tried for the incremental time filter, in order
const SINCE_PARAM_CANDIDATES: &[&str] = &["since", "updated_after", "modified_since"];

/// Generic paginated-REST client behavior
pub struct GenericBehavior {
    requests: RequestBuilder,
    max_pages: u32,
    page_delay: Duration,
}

impl GenericBehavior {
    pub fn new(requests: RequestBuilder) -> Self {
        Self {
            requests,
            max_pages: DEFAULT_MAX_PAGES,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    pub fn with_limits(requests: RequestBuilder, max_pages: u32, page_delay: Duration) -> Self {
        Self {
            requests,
            max_pages: max_pages.max(1),
            page_delay,
        }
    }

    /// Pick the incremental filter parameter: the first conventional name
    /// not already claimed by the job's declared query parameters.
    fn since_param(config: &JobConfig) -> &'static str {
        SINCE_PARAM_CANDIDATES
            .iter()
            .find(|name| !config.api.query_params.contains_key(**name))
            .copied()
            .unwrap_or(SINCE_PARAM_CANDIDATES[0])
    }
}

#[async_trait]
impl SourceBehavior for GenericBehavior {
    fn can_handle(&self, _source_type: &str) -> bool {
        true
    }

    fn display_name(&self) -> &'static str {
        "generic-rest"
    }

    async fn fetch(
        &self,
        config: &JobConfig,
        since: Option<DateTime<Utc>>,
        correlation_id: &str,
    ) -> Result<FetchOutcome, FetchError> {
        let pagination = config.extraction.pagination.as_ref();
        let response_path = config.extraction.response_path.as_deref();

        let mut params: BTreeMap<String, String> = pagination
            .map(ResponseExtractor::initial_params)
            .unwrap_or_default();

        if let Some(since) = since {
            params.insert(
                Self::since_param(config).to_string(),
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }

        let mut outcome = FetchOutcome::default();

        loop {
            let body = self.requests.execute_json(&config.api, &params).await?;
            let page_records = ResponseExtractor::extract_records(&body, response_path)?;

            debug!(
                correlation_id = %correlation_id,
                job = %config.job_key(),
                page = outcome.pages_processed + 1,
                records = page_records.len(),
                "Fetched page"
            );

            let has_next = match pagination {
                Some(p) => ResponseExtractor::has_next_page(&body, &page_records, p),
                None => false,
            };

            outcome.records.extend(page_records);
            outcome.pages_processed += 1;

            if !has_next {
                break;
            }

            if outcome.pages_processed >= self.max_pages {
                outcome.has_more = true;
                debug!(
                    correlation_id = %correlation_id,
                    job = %config.job_key(),
                    max_pages = self.max_pages,
                    "Page cap reached, remaining data deferred to next cycle"
                );
                break;
            }

            // pagination is Some here, has_next was computed from it
            let p = pagination.expect("has_next implies pagination config");
            params = ResponseExtractor::next_page_params(&params, &body, p);

            tokio::time::sleep(self.page_delay).await;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiConfig, AuthConfig, ExtractionConfig, HttpMethod};

    fn config_with_params(params: &[(&str, &str)]) -> JobConfig {
        JobConfig {
            tenant_id: "acme".to_string(),
            source_type: "rest".to_string(),
            instance_url: "https://api.example.com".to_string(),
            api: ApiConfig {
                endpoint: "https://api.example.com/v1/feedback".to_string(),
                method: HttpMethod::Get,
                headers: BTreeMap::new(),
                query_params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
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
    fn test_since_param_default() {
        let config = config_with_params(&[]);
        assert_eq!(GenericBehavior::since_param(&config), "since");
    }

    #[test]
    fn test_since_param_skips_taken_names() {
        let config = config_with_params(&[("since", "2024-01-01")]);
        assert_eq!(GenericBehavior::since_param(&config), "updated_after");

        let config = config_with_params(&[("since", "x"), ("updated_after", "y")]);
        assert_eq!(GenericBehavior::since_param(&config), "modified_since");
    }

    #[test]
    fn test_handles_everything() {
        let behavior = GenericBehavior::new(RequestBuilder::new().unwrap());
        assert!(behavior.can_handle("rest"));
        assert!(behavior.can_handle("anything-else"));
    }
}
