//! Shared utilities

pub mod retry;

pub use retry::{with_retry, with_retry_if, RetryConfig};
