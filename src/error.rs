//! Error types for trueform
//!
//! Remote failures are classified at the transport boundary into
//! [`ApiError`] or [`ConnectionError`]; job tracking adds timeout,
//! cancellation and job failure. Reconcilers wrap these with the resource
//! and action that failed.

use crate::client::errors::{ApiError, ConnectionError, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provider core
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Remote Errors
    // =========================================================================
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // =========================================================================
    // Job / Wait Errors
    // =========================================================================
    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: i64, reason: String },

    #[error("Timeout waiting for {operation} after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Cancelled while waiting for {operation}")]
    Cancelled { operation: String },

    // =========================================================================
    // Reconcile Errors
    // =========================================================================
    #[error("Could not {action} {resource}: {source}")]
    Resource {
        resource: String,
        action: String,
        source: Box<Error>,
    },

    // =========================================================================
    // Local Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach the resource and action that failed
    pub fn context(self, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Error::Resource {
            resource: resource.into(),
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// The classified API error behind this error, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(api) => Some(api),
            Error::Resource { source, .. } => source.api_error(),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.api_error().map(ApiError::kind)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    pub fn is_auth_error(&self) -> bool {
        self.kind().map(|k| k.is_auth()).unwrap_or(false)
    }

    pub fn is_validation_error(&self) -> bool {
        self.kind() == Some(ErrorKind::Validation)
    }

    /// Whether the host may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Timeout { .. } | Error::JobFailed { .. } => true,
            Error::Api(api) => matches!(api.kind(), ErrorKind::Internal | ErrorKind::Unclassified),
            Error::Resource { source, .. } => source.is_retryable(),
            Error::Cancelled { .. }
            | Error::Protocol(_)
            | Error::Configuration(_)
            | Error::JsonParse(_)
            | Error::Yaml(_)
            | Error::Io(_) => false,
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Timeout { .. } => true,
            Error::Resource { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for trueform
pub type Result<T> = std::result::Result<T, Error>;
