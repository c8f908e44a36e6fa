//! Errors raised while parsing and validating insert requests
//!
//! Both kinds are detected before any series is touched, so a request that
//! fails with one of these has no effect on the store.

use thiserror::Error;

use crate::models::ValueType;

/// Rule violated by a structurally well-formed request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("empty series name")]
    EmptySeriesName,

    #[error("no points given for series '{series}'")]
    NoPoints { series: String },

    #[error("invalid point at index {index} in series '{series}': expected [timestamp, value]")]
    InvalidPoint { series: String, index: usize },

    #[error("invalid timestamp at index {index} in series '{series}': timestamps must be integers")]
    InvalidTimestamp { series: String, index: usize },

    #[error("invalid value at index {index} in series '{series}': expected a float or integer")]
    InvalidValue { series: String, index: usize },

    #[error("mixed value types in series '{series}': expected {expected}, found {found} at index {index}")]
    MixedValueTypes {
        series: String,
        index: usize,
        expected: ValueType,
        found: ValueType,
    },

    #[error("type mismatch for series '{series}': series holds {established} values, got {found}")]
    TypeMismatch {
        series: String,
        established: ValueType,
        found: ValueType,
    },
}

/// Errors returned to the caller of an insert
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InsertError {
    /// Top level shape is not one of the accepted forms
    #[error("malformed insert request: {0}")]
    MalformedRequest(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),
}

impl InsertError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest(reason.into())
    }

    /// Short machine readable reason, used as a metrics label
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed",
            Self::Validation(e) => match e {
                ValidationError::EmptySeriesName => "empty_name",
                ValidationError::NoPoints { .. } => "no_points",
                ValidationError::InvalidPoint { .. } => "invalid_point",
                ValidationError::InvalidTimestamp { .. } => "invalid_timestamp",
                ValidationError::InvalidValue { .. } => "invalid_value",
                ValidationError::MixedValueTypes { .. } | ValidationError::TypeMismatch { .. } => {
                    "type_mismatch"
                }
            },
        }
    }
}
