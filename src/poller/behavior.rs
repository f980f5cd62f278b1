//! Source behavior strategy and registry
//!
//! A [`SourceBehavior`] produces the full record set for one polling cycle
//! of one job. The [`BehaviorRegistry`] holds an ordered list of behaviors
//! plus a mandatory fallback; the first behavior whose `can_handle` accepts
//! the source type wins. Registration order is the precedence order; there
//! is no reflection or discovery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::error::FetchError;
use crate::models::{FetchOutcome, JobConfig};

/// Fetch strategy for one source type
#[async_trait]
pub trait SourceBehavior: Send + Sync {
    /// Whether this behavior handles the given source type
    fn can_handle(&self, source_type: &str) -> bool;

    /// Human-readable name used in logs
    fn display_name(&self) -> &'static str;

    /// Produce all records for one polling cycle.
    ///
    /// `since` is the job's last successful poll time, used for incremental
    /// fetching; `correlation_id` tags this cycle's log lines.
    async fn fetch(
        &self,
        config: &JobConfig,
        since: Option<DateTime<Utc>>,
        correlation_id: &str,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Ordered behavior lookup with a mandatory fallback
pub struct BehaviorRegistry {
    behaviors: Vec<Arc<dyn SourceBehavior>>,
    fallback: Arc<dyn SourceBehavior>,
}

impl BehaviorRegistry {
    /// Create a registry with the given fallback. The fallback must accept
    /// every source type; it is returned whenever no registered behavior
    /// matches.
    pub fn new(fallback: Arc<dyn SourceBehavior>) -> Self {
        Self {
            behaviors: Vec::new(),
            fallback,
        }
    }

    /// Register a behavior. Earlier registrations take precedence.
    pub fn register(&mut self, behavior: Arc<dyn SourceBehavior>) {
        self.behaviors.push(behavior);
    }

    /// Select the behavior for a source type
    pub fn get(&self, source_type: &str) -> Arc<dyn SourceBehavior> {
        self.behaviors
            .iter()
            .find(|b| b.can_handle(source_type))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Number of registered behaviors, excluding the fallback
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBehavior {
        name: &'static str,
        handles: &'static str,
    }

    #[async_trait]
    impl SourceBehavior for StubBehavior {
        fn can_handle(&self, source_type: &str) -> bool {
            self.handles == "*" || self.handles == source_type
        }

        fn display_name(&self) -> &'static str {
            self.name
        }

        async fn fetch(
            &self,
            _config: &JobConfig,
            _since: Option<DateTime<Utc>>,
            _correlation_id: &str,
        ) -> Result<FetchOutcome, FetchError> {
            Ok(FetchOutcome::default())
        }
    }

    fn registry() -> BehaviorRegistry {
        let mut registry = BehaviorRegistry::new(Arc::new(StubBehavior {
            name: "fallback",
            handles: "*",
        }));
        registry.register(Arc::new(StubBehavior {
            name: "first",
            handles: "conversations",
        }));
        registry.register(Arc::new(StubBehavior {
            name: "second",
            handles: "conversations",
        }));
        registry
    }

    #[test]
    fn test_first_match_wins() {
        let registry = registry();
        assert_eq!(registry.get("conversations").display_name(), "first");
    }

    #[test]
    fn test_fallback_for_unknown_type() {
        let registry = registry();
        assert_eq!(registry.get("rest").display_name(), "fallback");
        assert_eq!(registry.get("").display_name(), "fallback");
    }

    #[test]
    fn test_len_excludes_fallback() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
    }
}
