//! Unified error handling for the seriesdb crate
//!
//! Domain errors live next to the code that raises them:
//!
//! - [`InsertError`] / [`ValidationError`] - request parsing and validation
//! - [`ReplicationError`] - propagation, bootstrap and membership
//! - [`ConfigError`] - configuration loading and validation
//!
//! [`Error`] wraps all of them so callers crossing module boundaries can use
//! a single type, and [`SeriesDbErrorTrait`] gives every error a common
//! handling interface.
//!
//! # Usage
//!
//! ```rust,ignore
//! use seriesdb::error::{Error, SeriesDbErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(error = %err, "retrying");
//!     } else {
//!         tracing::error!(error = %err, category = ?err.category(), "giving up");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::insert::error::{InsertError, ValidationError};
pub use crate::replication::error::ReplicationError;

/// Common trait for all seriesdb error types
pub trait SeriesDbErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Rejected input (malformed or invalid insert)
    Validation,
    /// Propagation and bootstrap errors
    Replication,
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Storage and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Replication => "replication",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl SeriesDbErrorTrait for InsertError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

impl SeriesDbErrorTrait for ReplicationError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Transient { .. } | Self::BootstrapIncomplete { .. } => true,
            Self::PeerRejected { .. }
            | Self::UnknownMember(_)
            | Self::DuplicateMember(_)
            | Self::PoolFull { .. }
            | Self::InvalidAddress { .. }
            | Self::Cancelled(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient { .. } => ErrorCategory::Network,
            _ => ErrorCategory::Replication,
        }
    }
}

/// Unified error type for the seriesdb crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Insert error: {0}")]
    Insert(#[from] InsertError),

    #[error("Replication error: {0}")]
    Replication(#[from] ReplicationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SeriesDbErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Insert(e) => e.is_recoverable(),
            Self::Replication(e) => e.is_recoverable(),
            Self::Config(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Insert(e) => e.category(),
            Self::Replication(e) => e.category(),
            Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Validation,
            Self::Http(_) => ErrorCategory::Network,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::Insert(err.into())
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
