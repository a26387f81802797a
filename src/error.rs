//! Error types for repo-dl
//!
//! This module provides error handling for the library, including:
//! - A single crate-wide [`Error`] enum covering configuration, transport and archive failures
//! - Context information (offending path, HTTP status, configuration key)
//! - Classification helpers used by the retry layer

use std::time::Duration;
use thiserror::Error;

/// Result type alias for repo-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for repo-dl
///
/// Each variant carries enough context to diagnose which remote path or
/// configuration value was involved.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.concurrency")
        key: Option<String>,
    },

    /// Transport-level failure from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote answered with a non-success status code
    #[error("HTTP {status} from {url}")]
    Http {
        /// The status code returned by the remote
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// Remote path does not exist (404 or an empty result)
    #[error("not found: {0}")]
    NotFound(String),

    /// A single request exceeded its per-attempt deadline
    #[error("request for {path} timed out after {after:?}")]
    Timeout {
        /// Tree-relative path of the file or directory being requested
        path: String,
        /// The deadline that was exceeded
        after: Duration,
    },

    /// Archive construction or serialization failed
    #[error("archive error: {0}")]
    Archive(String),

    /// A repository archive exceeded the configured size limit
    #[error("repository archive is too large ({size} bytes, limit {limit})")]
    TooLarge {
        /// Bytes seen so far (or announced by the remote)
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// A path could not be used as an archive entry or file name
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why the path was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON from the listing API
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Config`] naming the offending key.
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Returns true if the error means the remote object definitively does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Http { status, .. } => *status == 404,
            Error::Network(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}
