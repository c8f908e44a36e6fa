//! Acknowledgments sent back to insert callers

use serde::{Deserialize, Serialize};

use crate::storage::MergeSummary;

use super::error::InsertError;

/// Outcome of a successful insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertAck {
    /// Points accepted across every series of the request
    pub points: usize,
    /// Distinct series touched
    pub series: usize,
}

impl InsertAck {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn message(&self) -> String {
        format!("Inserted {} point(s) successfully.", self.points)
    }
}

impl From<MergeSummary> for InsertAck {
    fn from(summary: MergeSummary) -> Self {
        Self {
            points: summary.accepted,
            series: summary.series,
        }
    }
}

/// Success body: `{"success_msg": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertResponse {
    pub success_msg: String,
}

impl From<InsertAck> for InsertResponse {
    fn from(ack: InsertAck) -> Self {
        Self {
            success_msg: ack.message(),
        }
    }
}

/// Failure body: `{"error_msg": "..."}`
///
/// Carries only the reason; a rejected request never reports a count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_msg: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_msg: message.into(),
        }
    }
}

impl From<&InsertError> for ErrorResponse {
    fn from(error: &InsertError) -> Self {
        Self::new(error.to_string())
    }
}

/// Build the response body for an insert result
pub fn respond(result: &Result<InsertAck, InsertError>) -> Result<InsertResponse, ErrorResponse> {
    match result {
        Ok(ack) => Ok((*ack).into()),
        Err(e) => Err(e.into()),
    }
}
