//! Error types for the polling subsystem

use thiserror::Error;

/// Errors that can occur while fetching records from a remote source
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server responded with a non-success status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Invalid endpoint URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response body was not valid JSON
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    /// Primary record extraction failed
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Handing records to the message bus failed
    #[error("Publish failed: {0}")]
    Publish(String),
}

impl FetchError {
    /// Whether a later cycle may plausibly succeed without config changes
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout | Self::Publish(_) => true,
            Self::ServerError(status) => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::InvalidUrl(_) | Self::InvalidJson(_) | Self::Extract(_) => false,
        }
    }
}

/// Errors from evaluating a response-path expression
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Path expression could not be parsed
    #[error("Malformed response path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// Path stepped through a value of the wrong shape
    #[error("Path '{path}' does not match response shape")]
    ShapeMismatch { path: String },
}

impl ExtractError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn shape_mismatch(path: impl Into<String>) -> Self {
        Self::ShapeMismatch { path: path.into() }
    }
}

/// Scheduler lifecycle errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Scheduler was started twice
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler options failed validation
    #[error("Invalid scheduler option '{field}': {reason}")]
    InvalidOption { field: String, reason: String },
}

impl SchedulerError {
    pub fn invalid_option(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
