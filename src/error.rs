//! Unified error handling for the inflow crate
//!
//! Domain-specific errors (fetching, extraction, scheduling) live next to
//! the code that produces them; this module wraps them into a single
//! [`Error`] enum usable across module boundaries, with coarse
//! classification for handling strategies.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::poller::error::{ExtractError, FetchError, SchedulerError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Extraction and response-shape errors
    Extraction,
    /// Redis / Postgres backend errors
    Backend,
    /// Configuration and validation errors
    Config,
    /// Scheduler lifecycle errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the inflow crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-cycle errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Response-path extraction errors
    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Scheduler lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Redis command errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis connection pool errors
    #[error("Redis pool error: {0}")]
    RedisPool(String),

    /// Postgres errors
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Postgres connection pool errors
    #[error("Postgres pool error: {0}")]
    PostgresPool(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Extract(_) => false,
            Self::Scheduler(_) => false,
            // Backend outages are transient by policy: polling degrades
            // (fail-open limiter, default state) instead of stopping
            Self::Redis(_) | Self::RedisPool(_) | Self::Postgres(_) | Self::PostgresPool(_) => {
                true
            }
            Self::Http(_) | Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) | Self::Http(_) => ErrorCategory::Network,
            Self::Extract(_) | Self::Json(_) => ErrorCategory::Extraction,
            Self::Redis(_)
            | Self::RedisPool(_)
            | Self::Postgres(_)
            | Self::PostgresPool(_)
            | Self::Io(_) => ErrorCategory::Backend,
            Self::Config(_) => ErrorCategory::Config,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::RedisPool(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::PostgresPool(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let fetch_err = Error::Fetch(FetchError::Timeout);
        assert_eq!(fetch_err.category(), ErrorCategory::Network);

        let extract_err = Error::Extract(ExtractError::shape_mismatch("items"));
        assert_eq!(extract_err.category(), ErrorCategory::Extraction);

        let config_err = Error::config("missing redis url");
        assert_eq!(config_err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Fetch(FetchError::Timeout).is_recoverable());
        assert!(!Error::Extract(ExtractError::shape_mismatch("items")).is_recoverable());
        assert!(!Error::config("bad").is_recoverable());
        assert!(Error::RedisPool("timed out".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let fetch: Error = FetchError::Timeout.into();
        assert!(matches!(fetch, Error::Fetch(_)));

        let sched: Error = SchedulerError::AlreadyRunning.into();
        assert!(matches!(sched, Error::Scheduler(_)));
    }
}
