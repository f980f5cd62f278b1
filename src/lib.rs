//! inflow - Multi-source feedback polling daemon
//!
//! Continuously ingests customer feedback from tenant-configured REST APIs
//! and publishes raw records to a Redis stream for downstream processing.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Job configuration and polling state types
//! - [`poller`] - Scheduling, fetch behaviors, pagination, and extraction
//! - [`limiter`] - Distributed sliding-window rate limiting
//! - [`state`] - Per-job polling state and circuit breaking
//! - [`sources`] - Job configuration sources
//! - [`publish`] - Record publishing to the downstream pipeline
//! - [`error`] - Unified error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use inflow::poller::{default_registry, JobScheduler, SchedulerOptions};
//! use inflow::sources::StaticConfigSource;
//! use inflow::state::MemoryStateStore;
//! use inflow::limiter::MemoryRateLimiter;
//! use inflow::publish::MemoryPublisher;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scheduler = JobScheduler::new(
//!         Arc::new(StaticConfigSource::new(vec![])),
//!         Arc::new(MemoryStateStore::new()),
//!         Arc::new(MemoryRateLimiter::new()),
//!         Arc::new(MemoryPublisher::new()),
//!         default_registry()?,
//!         SchedulerOptions::default(),
//!     )?;
//!     scheduler.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod limiter;
pub mod models;
pub mod poller;
pub mod publish;
pub mod sources;
pub mod state;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::limiter::RateLimiter;
    pub use crate::models::{ApiConfig, ExtractionConfig, FetchOutcome, JobConfig, PollingState};
    pub use crate::poller::{BehaviorRegistry, JobScheduler, SchedulerOptions, SourceBehavior};
    pub use crate::publish::Publisher;
    pub use crate::sources::ConfigSource;
    pub use crate::state::StateStore;
}

// Direct re-exports for convenience
pub use models::{FetchOutcome, JobConfig, PollingState};
