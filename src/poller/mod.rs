//! Polling engine: scheduling, fetching, and extraction
//!
//! `scheduler` owns job lifecycles, `behavior` selects a fetch strategy per
//! source type, `request` and `extract` do the HTTP and response-shaping
//! work the behaviors share. `generic` is the paginated-REST fallback and
//! `two_phase` handles search+detail conversation sources.

pub mod behavior;
pub mod error;
pub mod extract;
pub mod generic;
pub mod request;
pub mod scheduler;
pub mod two_phase;

use std::sync::Arc;

pub use behavior::{BehaviorRegistry, SourceBehavior};
pub use error::{ExtractError, FetchError, SchedulerError};
pub use extract::{ResponseExtractor, ResponsePath};
pub use generic::GenericBehavior;
pub use request::RequestBuilder;
pub use scheduler::{JobScheduler, SchedulerOptions};
pub use two_phase::ConversationsBehavior;

/// Build the stock registry: conversation search+detail first, generic
/// paginated REST as the fallback for everything else
pub fn default_registry() -> Result<BehaviorRegistry, FetchError> {
    let mut registry = BehaviorRegistry::new(Arc::new(GenericBehavior::new(RequestBuilder::new()?)));
    registry.register(Arc::new(ConversationsBehavior::new(RequestBuilder::new()?)));
    Ok(registry)
}
