//! seriesdb - time-series ingestion with replica bootstrap
//!
//! Accepts batches of `(timestamp, value)` points for named series, merges
//! them into per-series ordered storage and keeps every other pool member
//! converged with the local data.
//!
//! # Architecture
//!
//! - [`insert`] - request parsing, validation and the insert pipeline
//! - [`storage`] - per-series ordered storage and per-series locking
//! - [`replication`] - pool membership, bootstrap and propagation
//! - [`node`] - one pool member wiring the above together
//! - [`server`] - HTTP API of a member
//! - [`client`] - HTTP client for a member
//! - [`config`] - configuration management
//! - [`metrics`] - Prometheus metrics
//! - [`models`] - core data structures
//! - [`utils`] - retry helpers
//!
//! # Example
//!
//! ```no_run
//! use seriesdb::node::Node;
//! use seriesdb::replication::ReplicationConfig;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let node = Node::new("node-a", ReplicationConfig::default());
//!     let ack = node.insert(&json!({"cpu": [[1, 0.5], [2, 0.7]]})).await?;
//!     println!("{}", ack.message());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod insert;
pub mod metrics;
pub mod models;
pub mod node;
pub mod replication;
pub mod server;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{ClientConfig, SeriesDbClient};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, SeriesDbErrorTrait};
    pub use crate::insert::{InsertAck, InsertError, InsertService, ValidationError};
    pub use crate::models::{Point, SeriesBatch, SeriesInfo, Value, ValueType};
    pub use crate::node::Node;
    pub use crate::replication::{PoolStatus, ReplicationConfig, ReplicationManager};
    pub use crate::server::SeriesDbServer;
    pub use crate::storage::{SeriesFilter, SeriesStore};
}

// Direct re-exports for convenience
pub use models::{Point, SeriesBatch, SeriesInfo, Value, ValueType};
pub use node::Node;
