//! Error types for repoindex.
//!
//! Library crates use [`RepoIndexError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all repoindex operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoIndexError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to an upstream service.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed top-level response or document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database, staging or index layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unknown source, bad identifier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Unrecoverable failure of one source importer.
    #[error("source '{name}' failed: {message}")]
    Source { name: String, message: String },

    /// An authenticated session expired again after the single reconnect.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// One or more failures were recorded during an import run.
    #[error("{failures} failure(s) during import: {summary}")]
    Import { failures: usize, summary: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RepoIndexError>;

impl RepoIndexError {
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

    /// Create a source-scoped failure.
    pub fn source_failure(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
