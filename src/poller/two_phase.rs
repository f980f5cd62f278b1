//! Two-phase search+detail behavior for conversation-style sources
//!
//! Some APIs cannot hand over full records in one listing call: the search
//! endpoint only returns candidate items in a time range, and full detail
//! requires a second call per parent conversation. This behavior pages
//! through search results, groups candidates by conversation id to batch
//! the detail calls, and merges search metadata (display title) into each
//! detailed record keyed by item id.
//!
//! Unlike [`GenericBehavior`](super::generic::GenericBehavior)'s
//! all-or-nothing page loop, a failure fetching one conversation's details
//! is logged and skipped; the rest of the cycle proceeds.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::behavior::SourceBehavior;
use super::error::FetchError;
use super::extract::ResponseExtractor;
use super::request::RequestBuilder;
use crate::models::{ApiConfig, FetchOutcome, JobConfig};

/// Maximum search pages fetched per cycle
pub const DEFAULT_MAX_SEARCH_PAGES: u32 = 5;

/// How far back to search when the job has never succeeded
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(24 * 3600);

/// Delay between detail fetches for successive conversations
const GROUP_DELAY: Duration = Duration::from_millis(200);

/// Delay between search pages
const PAGE_DELAY: Duration = Duration::from_secs(1);

/// A search hit pending detail resolution
struct Candidate {
    id: String,
    title: Option<String>,
}

/// Search-then-detail behavior for the `conversations` source type
pub struct ConversationsBehavior {
    requests: RequestBuilder,
    max_search_pages: u32,
    lookback: Duration,
}

impl ConversationsBehavior {
    pub fn new(requests: RequestBuilder) -> Self {
        Self {
            requests,
            max_search_pages: DEFAULT_MAX_SEARCH_PAGES,
            lookback: DEFAULT_LOOKBACK,
        }
    }

    pub fn with_limits(
        requests: RequestBuilder,
        max_search_pages: u32,
        lookback: Duration,
    ) -> Self {
        Self {
            requests,
            max_search_pages: max_search_pages.max(1),
            lookback,
        }
    }

    /// Group search hits by conversation id, preserving per-item metadata
    fn group_candidates(items: &[Value]) -> BTreeMap<String, Vec<Candidate>> {
        let mut groups: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();

        for item in items {
            let Some(conversation_id) = value_as_id(item.get("conversation_id")) else {
                debug!("Search hit without conversation_id, skipping");
                continue;
            };
            let Some(id) = value_as_id(item.get("id")) else {
                debug!(conversation_id = %conversation_id, "Search hit without id, skipping");
                continue;
            };

            groups.entry(conversation_id).or_default().push(Candidate {
                id,
                title: item
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }

        groups
    }

    /// Fetch one conversation's detail and merge candidate metadata into
    /// every detailed item that matches a candidate id.
    async fn fetch_group(
        &self,
        api: &ApiConfig,
        conversation_id: &str,
        candidates: &[Candidate],
    ) -> Result<Vec<Value>, FetchError> {
        let mut detail_api = api.clone();
        detail_api.endpoint = format!(
            "{}/{}",
            api.endpoint.trim_end_matches('/'),
            conversation_id
        );
        detail_api.query_params.clear();
        detail_api.body = None;

        let body = self
            .requests
            .execute_json(&detail_api, &BTreeMap::new())
            .await?;

        let detailed = body
            .get("messages")
            .cloned()
            .map(|v| match v {
                Value::Array(items) => items,
                other => vec![other],
            })
            .unwrap_or_default();

        let mut records = Vec::new();
        for mut item in detailed {
            let Some(item_id) = value_as_id(item.get("id")) else {
                continue;
            };
            let Some(candidate) = candidates.iter().find(|c| c.id == item_id) else {
                continue;
            };

            if let Value::Object(map) = &mut item {
                map.insert(
                    "conversation_id".to_string(),
                    Value::String(conversation_id.to_string()),
                );
                if let Some(title) = &candidate.title {
                    map.insert(
                        "conversation_title".to_string(),
                        Value::String(title.clone()),
                    );
                }
            }
            records.push(item);
        }

        Ok(records)
    }
}

fn value_as_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl SourceBehavior for ConversationsBehavior {
    fn can_handle(&self, source_type: &str) -> bool {
        source_type == "conversations"
    }

    fn display_name(&self) -> &'static str {
        "conversations"
    }

    async fn fetch(
        &self,
        config: &JobConfig,
        since: Option<DateTime<Utc>>,
        correlation_id: &str,
    ) -> Result<FetchOutcome, FetchError> {
        let search_from = since.unwrap_or_else(|| {
            Utc::now()
                - ChronoDuration::from_std(self.lookback)
                    .unwrap_or_else(|_| ChronoDuration::hours(24))
        });
        let response_path = config.extraction.response_path.as_deref().or(Some("items"));

        let mut outcome = FetchOutcome::default();

        for page in 1..=self.max_search_pages {
            let mut params = BTreeMap::new();
            params.insert(
                "updated_since".to_string(),
                search_from.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
            params.insert("page".to_string(), page.to_string());

            let body = self.requests.execute_json(&config.api, &params).await?;
            let candidates = ResponseExtractor::extract_records(&body, response_path)?;
            outcome.pages_processed += 1;

            if candidates.is_empty() {
                break;
            }

            debug!(
                correlation_id = %correlation_id,
                job = %config.job_key(),
                page = page,
                candidates = candidates.len(),
                "Search page fetched"
            );

            let groups = Self::group_candidates(&candidates);
            let group_count = groups.len();

            for (index, (conversation_id, group)) in groups.into_iter().enumerate() {
                match self
                    .fetch_group(&config.api, &conversation_id, &group)
                    .await
                {
                    Ok(records) => outcome.records.extend(records),
                    Err(e) => {
                        // One failed conversation must not sink the cycle
                        warn!(
                            correlation_id = %correlation_id,
                            job = %config.job_key(),
                            conversation_id = %conversation_id,
                            error = %e,
                            "Detail fetch failed, skipping conversation"
                        );
                    }
                }

                if index + 1 < group_count {
                    tokio::time::sleep(GROUP_DELAY).await;
                }
            }

            if page == self.max_search_pages {
                // Last allowed page still returned candidates
                outcome.has_more = true;
                break;
            }

            tokio::time::sleep(PAGE_DELAY).await;
        }

        Ok(outcome)
    }
}
