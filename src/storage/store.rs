//! The series store: merge and read operations over all series

use tracing::debug;

use crate::insert::error::ValidationError;
use crate::insert::validator;
use crate::models::{Point, SeriesBatch, SeriesInfo};

use super::coordinator::{ConcurrencyCoordinator, MergeSummary, SeriesSlot, WriteSet};
use super::filter::SeriesFilter;
use super::series::Series;

/// All series held by one pool member
///
/// Writes go through the [`ConcurrencyCoordinator`]; reads take a shared
/// lock on one series at a time and always observe whole merges.
#[derive(Default)]
pub struct SeriesStore {
    coordinator: ConcurrencyCoordinator,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the series named by `batches` for a multi-series merge
    pub async fn lock_for(&self, batches: &[SeriesBatch]) -> WriteSet {
        self.coordinator
            .lock(batches.iter().map(|b| b.name.as_str()))
            .await
    }

    /// Unlock a write set whose merge was rejected
    ///
    /// Slots the set created and never filled are dropped from the index.
    pub async fn abandon(&self, set: WriteSet) {
        let vacant = set.vacant_names();
        drop(set);
        if vacant.is_empty() {
            return;
        }

        let released = self
            .coordinator
            .release(vacant.iter().map(String::as_str))
            .await;
        if released > 0 {
            debug!(released, "Released vacant series slots");
        }
    }

    /// Merge points into one series, returning the number of points accepted
    ///
    /// Overwrites of existing timestamps count as accepted.
    pub async fn merge(&self, name: &str, points: &[Point]) -> Result<usize, ValidationError> {
        match validator::homogeneous_batch(name, points)? {
            Some(batch) => Ok(self.merge_batches(&[batch]).await?.accepted),
            None => Ok(0),
        }
    }

    /// Merge several series atomically with respect to type checks
    pub async fn merge_batches(
        &self,
        batches: &[SeriesBatch],
    ) -> Result<MergeSummary, ValidationError> {
        let mut set = self.lock_for(batches).await;
        match set.apply(batches) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.abandon(set).await;
                Err(e)
            }
        }
    }

    async fn with_series<T>(&self, name: &str, f: impl FnOnce(&Series) -> T) -> Option<T> {
        let slot = self.coordinator.slot(name).await?;
        let guard = slot.read().await;
        guard.as_ref().filter(|s| !s.is_empty()).map(f)
    }

    /// All points of a series in ascending timestamp order
    ///
    /// An unknown series yields an empty result.
    pub async fn read(&self, name: &str) -> Vec<Point> {
        self.with_series(name, Series::points).await.unwrap_or_default()
    }

    /// Points with `start <= timestamp < end`
    pub async fn read_range(&self, name: &str, start: Option<i64>, end: Option<i64>) -> Vec<Point> {
        self.with_series(name, |s| s.range(start, end))
            .await
            .unwrap_or_default()
    }

    /// Length, type, start and end of a series; `None` if it does not exist
    pub async fn describe(&self, name: &str) -> Option<SeriesInfo> {
        self.with_series(name, Series::info).await.flatten()
    }

    /// Copy of a whole series, suitable for transfer to another member
    pub async fn export(&self, name: &str) -> Option<SeriesBatch> {
        self.with_series(name, |s| SeriesBatch {
            name: s.name().to_string(),
            value_type: s.value_type(),
            points: s.points(),
        })
        .await
    }

    async fn visible(&self) -> Vec<(String, SeriesSlot)> {
        let mut visible = Vec::new();
        for (name, slot) in self.coordinator.slots().await {
            if slot.read().await.as_ref().is_some_and(|s| !s.is_empty()) {
                visible.push((name, slot));
            }
        }
        visible
    }

    /// Names of every visible series, sorted
    pub async fn names(&self) -> Vec<String> {
        self.visible().await.into_iter().map(|(name, _)| name).collect()
    }

    /// Metadata of every series matching `filter`, sorted by name
    pub async fn list(&self, filter: &SeriesFilter) -> Vec<SeriesInfo> {
        let mut rows = Vec::new();
        for (_, slot) in self.coordinator.slots().await {
            let info = slot.read().await.as_ref().and_then(Series::info);
            if let Some(info) = info.filter(|i| filter.matches(i)) {
                rows.push(info);
            }
        }
        rows
    }

    /// Number of visible series
    pub async fn len(&self) -> usize {
        self.visible().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total number of points across all series
    pub async fn total_points(&self) -> usize {
        let mut total = 0;
        for (_, slot) in self.coordinator.slots().await {
            total += slot.read().await.as_ref().map_or(0, Series::len);
        }
        total
    }
}
