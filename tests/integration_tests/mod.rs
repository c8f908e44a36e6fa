//! Integration tests module
//!
//! End-to-end tests for seriesdb, including:
//! - Parse, validate and merge of client requests
//! - Many concurrent writers over shared series
//! - Replica bootstrap and steady-state propagation
//! - The HTTP API between two live members

pub mod concurrency_test;
pub mod http_test;
pub mod insert_test;
pub mod replication_test;
