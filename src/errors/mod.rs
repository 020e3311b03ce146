//! # Error Handling
//!
//! Error types for the bagplane control plane, defined with `thiserror`.
//!
//! The variants follow the failure taxonomy of the compile/publish
//! pipeline: `Parse` and `Validation` are fatal to a single databag
//! file's compilation, `Consistency` is fatal to a single publish cycle,
//! and `Internal` marks an invariant violation that the process should
//! not survive.

use std::path::PathBuf;

/// Custom result type for bagplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bagplane control plane
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or unreadable databag document
    #[error("Databag parse error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Semantic errors in a databag (conflicting availability, unknown
    /// scheme, bad match pattern, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Dangling cross-reference detected while assembling a snapshot
    #[error("Snapshot consistency error: {0}")]
    Consistency(String),

    /// Network transport errors (gRPC)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violations (naming engine and merge logic diverged)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new consistency error
    pub fn consistency<S: Into<String>>(message: S) -> Self {
        Self::Consistency(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// True for errors that indicate a broken program invariant rather
    /// than bad input; the event worker terminates the process on these.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}
