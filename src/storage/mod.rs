//! Per-series ordered storage
//!
//! - [`series`] - one series: points keyed by timestamp
//! - [`coordinator`] - per-series locking for concurrent writers
//! - [`store`] - merge, read and listing operations over all series
//! - [`filter`] - property filters for listings

pub mod coordinator;
pub mod filter;
pub mod series;
pub mod store;

pub use coordinator::{ConcurrencyCoordinator, MergeSummary, WriteSet};
pub use filter::{Comparison, FilterError, SeriesCondition, SeriesFilter};
pub use series::{MergeOutcome, Series};
pub use store::SeriesStore;
