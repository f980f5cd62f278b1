//! In-memory state store for local runs and tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use super::StateStore;
use crate::models::PollingState;

/// Process-local state store; no TTL, no persistence across restarts
#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, PollingState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: &str, source_type: &str, instance_url: &str) -> String {
        format!("{tenant_id}:{source_type}:{instance_url}")
    }

    fn with_state<R>(
        &self,
        tenant_id: &str,
        source_type: &str,
        instance_url: &str,
        f: impl FnOnce(&mut PollingState) -> R,
    ) -> R {
        let mut states = match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = states
            .entry(Self::key(tenant_id, source_type, instance_url))
            .or_default();
        f(state)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_state(
        &self,
        tenant_id: &str,
        source_type: &str,
        instance_url: &str,
    ) -> PollingState {
        self.with_state(tenant_id, source_type, instance_url, |s| s.clone())
    }

    async fn record_attempt(&self, tenant_id: &str, source_type: &str, instance_url: &str) {
        self.with_state(tenant_id, source_type, instance_url, |s| {
            s.last_poll_attempt = Some(Utc::now());
        });
    }

    async fn record_success(&self, tenant_id: &str, source_type: &str, instance_url: &str) {
        self.with_state(tenant_id, source_type, instance_url, |s| {
            s.last_successful_poll = Some(Utc::now());
            s.consecutive_failures = 0;
            s.last_error = None;
            s.last_error_at = None;
        });
    }

    async fn record_failure(
        &self,
        tenant_id: &str,
        source_type: &str,
        instance_url: &str,
        error: &str,
        max_failures: u32,
    ) -> bool {
        self.with_state(tenant_id, source_type, instance_url, |s| {
            s.consecutive_failures += 1;
            s.last_error = Some(error.to_string());
            s.last_error_at = Some(Utc::now());
            s.is_disabled(max_failures)
        })
    }

    async fn reset_failure_count(&self, tenant_id: &str, source_type: &str, instance_url: &str) {
        self.with_state(tenant_id, source_type, instance_url, |s| {
            s.consecutive_failures = 0;
            s.last_error = None;
            s.last_error_at = None;
        });
    }
}
