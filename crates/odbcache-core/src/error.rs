//! Error types for odbcache-core
//!
//! Every failure is scoped to the single operation that raised it. The
//! [`ErrorKind`] taxonomy tells callers how to surface it: configuration and
//! upstream errors fail the request, IO errors abort a propagation.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for odbcache operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // Configuration Errors
    // ===================
    #[error("Failed to read environment table: {path}")]
    EnvironmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed environment table in {path}: {source}")]
    EnvironmentParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No environment entry for host '{host}' and no wildcard fallback")]
    NoMatchingHost { host: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ===================
    // Upstream Errors
    // ===================
    #[error("Upstream request to {url} failed: {source}")]
    UpstreamRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream request to {url} returned HTTP {status}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Upstream request to {url} timed out after {timeout_ms}ms")]
    UpstreamTimeout { url: String, timeout_ms: u64 },

    // ===================
    // IO Errors
    // ===================
    #[error("Failed to copy {from} to {to}")]
    ConfigCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File watcher error: {message}")]
    WatchError {
        message: String,
        #[source]
        source: Option<notify::Error>,
    },
}

/// Broad classification of a [`CoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Environment table missing, malformed, or without a matching host
    Configuration,
    /// Upstream fetch failed, timed out, or returned a non-success status
    Upstream,
    /// Filesystem failure while propagating configuration
    Io,
}

impl CoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::EnvironmentRead { .. }
            | CoreError::EnvironmentParse { .. }
            | CoreError::NoMatchingHost { .. }
            | CoreError::InvalidConfig { .. } => ErrorKind::Configuration,
            CoreError::UpstreamRequest { .. }
            | CoreError::UpstreamStatus { .. }
            | CoreError::UpstreamTimeout { .. } => ErrorKind::Upstream,
            CoreError::ConfigCopy { .. } | CoreError::WatchError { .. } => ErrorKind::Io,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_upstream(&self) -> bool {
        self.kind() == ErrorKind::Upstream
    }
}

impl From<notify::Error> for CoreError {
    fn from(err: notify::Error) -> Self {
        CoreError::WatchError {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
