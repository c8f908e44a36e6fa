//! Prometheus metrics for ingestion and replication
//!
//! This module provides metrics tracking for:
//! - Ingestion: accepted points, accepted and rejected requests, merge latency
//! - Replication: forwarded batches, retries, failures, members still syncing
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all ingestion metrics
struct IngestMetrics {
    points_inserted: Counter,
    requests_accepted: Counter,
    requests_rejected: CounterVec,
    replicated_points: Counter,
    merge_duration: Histogram,
}

/// Container for all replication metrics
struct ReplicationMetrics {
    batches_forwarded: CounterVec,
    retries: CounterVec,
    failures: CounterVec,
    series_transferred: CounterVec,
    members_pending: Gauge,
}

static INGEST_METRICS: OnceLock<IngestMetrics> = OnceLock::new();

static REPLICATION_METRICS: OnceLock<ReplicationMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let ingest = IngestMetrics {
        points_inserted: register_counter!(
            "seriesdb_points_inserted_total",
            "Total points accepted by client inserts"
        )?,
        requests_accepted: register_counter!(
            "seriesdb_insert_requests_accepted_total",
            "Total insert requests accepted"
        )?,
        requests_rejected: register_counter_vec!(
            "seriesdb_insert_requests_rejected_total",
            "Total insert requests rejected by reason",
            &["reason"]
        )?,
        replicated_points: register_counter!(
            "seriesdb_replicated_points_applied_total",
            "Total points merged from replicated batches"
        )?,
        merge_duration: register_histogram!(
            "seriesdb_merge_duration_seconds",
            "Time spent holding series locks for one insert",
            vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
        )?,
    };

    let replication = ReplicationMetrics {
        batches_forwarded: register_counter_vec!(
            "seriesdb_replication_batches_forwarded_total",
            "Total batches delivered to pool members",
            &["member"]
        )?,
        retries: register_counter_vec!(
            "seriesdb_replication_retries_total",
            "Total delivery retries by member",
            &["member"]
        )?,
        failures: register_counter_vec!(
            "seriesdb_replication_failures_total",
            "Total deliveries abandoned after exhausting retries",
            &["member"]
        )?,
        series_transferred: register_counter_vec!(
            "seriesdb_bootstrap_series_transferred_total",
            "Total series copied to joining members",
            &["member"]
        )?,
        members_pending: register_gauge!(
            "seriesdb_pool_members_pending",
            "Pool members not yet consistent"
        )?,
    };

    INGEST_METRICS.set(ingest).map_err(|_| "Ingest metrics already initialized")?;
    REPLICATION_METRICS
        .set(replication)
        .map_err(|_| "Replication metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    INGEST_METRICS.get().is_some() && REPLICATION_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record an accepted insert
pub fn record_insert_accepted(points: usize) {
    let Some(m) = INGEST_METRICS.get() else {
        return;
    };

    m.requests_accepted.inc();
    m.points_inserted.inc_by(points as f64);
}

/// Record a rejected insert
pub fn record_insert_rejected(reason: &str) {
    if let Some(m) = INGEST_METRICS.get() {
        m.requests_rejected.with_label_values(&[reason]).inc();
    }
}

/// Record points merged from a peer
pub fn record_replicated_points(points: usize) {
    if let Some(m) = INGEST_METRICS.get() {
        m.replicated_points.inc_by(points as f64);
    }
}

/// Record how long series locks were held for one merge
pub fn observe_merge_duration(secs: f64) {
    if let Some(m) = INGEST_METRICS.get() {
        m.merge_duration.observe(secs);
    }
}

/// Record a batch delivered to a member
pub fn record_batch_forwarded(member: &str) {
    if let Some(m) = REPLICATION_METRICS.get() {
        m.batches_forwarded.with_label_values(&[member]).inc();
    }
}

/// Record a delivery retry
pub fn record_replication_retry(member: &str) {
    if let Some(m) = REPLICATION_METRICS.get() {
        m.retries.with_label_values(&[member]).inc();
    }
}

/// Record a delivery abandoned after all retries
pub fn record_replication_failure(member: &str) {
    if let Some(m) = REPLICATION_METRICS.get() {
        m.failures.with_label_values(&[member]).inc();
    }
}

/// Record series copied to a joining member
pub fn record_series_transferred(member: &str, count: usize) {
    if let Some(m) = REPLICATION_METRICS.get() {
        m.series_transferred
            .with_label_values(&[member])
            .inc_by(count as f64);
    }
}

/// Update the number of members that are not consistent yet
pub fn set_members_pending(count: usize) {
    if let Some(m) = REPLICATION_METRICS.get() {
        m.members_pending.set(count as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================
