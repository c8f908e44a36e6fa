//! The insert pipeline
//!
//! ```text
//! body -> parser -> validator -> lock series -> type check + merge
//!      -> queue for replication -> release locks -> acknowledgment
//! ```
//!
//! Parsing and validation finish before any lock is taken. The established
//! type checks run under the locks, before the first merge, so a rejected
//! request leaves every series untouched.

pub mod error;
pub mod parser;
pub mod response;
pub mod validator;

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::replication::{ReplicatedBatch, ReplicationManager};
use crate::storage::SeriesStore;

pub use error::{InsertError, ValidationError};
pub use parser::{ParsedRequest, RequestShape};
pub use response::{ErrorResponse, InsertAck, InsertResponse};

/// Entry point for client inserts and replicated batches
pub struct InsertService {
    store: Arc<SeriesStore>,
    replication: Arc<ReplicationManager>,
}

impl InsertService {
    pub fn new(store: Arc<SeriesStore>, replication: Arc<ReplicationManager>) -> Self {
        Self { store, replication }
    }

    pub fn store(&self) -> &Arc<SeriesStore> {
        &self.store
    }

    /// Insert a decoded JSON request
    pub async fn insert(&self, body: &serde_json::Value) -> Result<InsertAck, InsertError> {
        let result = match parser::parse(body) {
            Ok(request) => self.insert_parsed(request).await,
            Err(e) => Err(e),
        };
        Self::record(&result);
        result
    }

    /// Insert a raw JSON request body
    pub async fn insert_slice(&self, bytes: &[u8]) -> Result<InsertAck, InsertError> {
        let result = match parser::parse_slice(bytes) {
            Ok(request) => self.insert_parsed(request).await,
            Err(e) => Err(e),
        };
        Self::record(&result);
        result
    }

    async fn insert_parsed(&self, request: ParsedRequest) -> Result<InsertAck, InsertError> {
        let batches = validator::validate(&request)?;
        if batches.is_empty() {
            return Ok(InsertAck::empty());
        }

        let started = Instant::now();
        let mut set = self.store.lock_for(&batches).await;

        let summary = match set.apply(&batches) {
            Ok(summary) => summary,
            Err(e) => {
                self.store.abandon(set).await;
                return Err(e.into());
            }
        };

        // Queued before the locks go so members see merges in order
        self.replication.propagate(&batches);
        drop(set);

        metrics::observe_merge_duration(started.elapsed().as_secs_f64());
        debug!(
            series = summary.series,
            created = summary.created,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Merged insert"
        );

        Ok(summary.into())
    }

    fn record(result: &Result<InsertAck, InsertError>) {
        match result {
            Ok(ack) => {
                metrics::record_insert_accepted(ack.points);
                info!(points = ack.points, series = ack.series, "Insert accepted");
            }
            Err(e) => {
                metrics::record_insert_rejected(e.reason());
                warn!(reason = e.reason(), error = %e, "Insert rejected");
            }
        }
    }

    /// Merge a batch forwarded by another member
    ///
    /// Goes through the same series locks and type checks as a client
    /// insert but is not propagated again.
    pub async fn apply_replicated(&self, batch: &ReplicatedBatch) -> Result<usize, ValidationError> {
        let summary = self.store.merge_batches(&batch.series).await?;

        metrics::record_replicated_points(summary.accepted);
        debug!(
            origin = %batch.origin,
            sequence = batch.sequence,
            points = summary.accepted,
            "Applied replicated batch"
        );
        Ok(summary.accepted)
    }
}
