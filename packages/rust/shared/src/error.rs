//! Error types for relayscout.
//!
//! Library crates use [`RelayScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Failures of external services (search, geolocation, probed hosts) are not
//! errors here: they surface as negative verdicts in the probe crate.

use std::path::PathBuf;

/// Top-level error type for all relayscout operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Local HTTP setup error (client construction, invalid request URL).
    #[error("network error: {0}")]
    Network(String),

    /// Input parsing error (template, endpoints file).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed endpoint, bad threshold, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Artifact publishing or downstream trigger error.
    #[error("publish error: {0}")]
    Publish(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RelayScoutError>;

impl RelayScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a publish error from any displayable message.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
