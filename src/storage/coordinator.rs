//! Per-series write coordination
//!
//! Every series sits behind its own lock. Writers lock exactly the series a
//! request touches, always in ascending name order, so two requests sharing
//! series can never deadlock and requests over disjoint series never wait on
//! each other. The index lock is only held long enough to look up or create
//! a slot, never across a merge.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::insert::error::ValidationError;
use crate::insert::validator;
use crate::models::{SeriesBatch, ValueType};

use super::series::{MergeOutcome, Series};

/// Lock protecting one series; `None` until the first point is merged
pub(crate) type SeriesSlot = Arc<RwLock<Option<Series>>>;

/// Owner of the series index and of the per-series locks
#[derive(Default)]
pub struct ConcurrencyCoordinator {
    slots: RwLock<HashMap<String, SeriesSlot>>,
}

impl ConcurrencyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of an existing series, if any
    pub(crate) async fn slot(&self, name: &str) -> Option<SeriesSlot> {
        self.slots.read().await.get(name).cloned()
    }

    /// Snapshot of the index, sorted by series name
    pub(crate) async fn slots(&self) -> Vec<(String, SeriesSlot)> {
        let mut slots: Vec<_> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }

    async fn slot_or_insert(&self, name: &str) -> SeriesSlot {
        if let Some(slot) = self.slot(name).await {
            return slot;
        }

        self.slots
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(None)))
            .clone()
    }

    async fn is_current(&self, name: &str, slot: &SeriesSlot) -> bool {
        self.slots
            .read()
            .await
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Acquire exclusive access to the named series
    ///
    /// Names are deduplicated and locked in ascending order. Series that do
    /// not exist yet get an empty slot which stays invisible to readers
    /// until something is merged into it.
    pub async fn lock<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> WriteSet {
        let names: BTreeSet<&str> = names.into_iter().collect();
        let mut guards = Vec::with_capacity(names.len());

        for name in names {
            loop {
                let slot = self.slot_or_insert(name).await;
                let guard = slot.clone().write_owned().await;
                // A vacant slot may have been pruned between lookup and lock
                if self.is_current(name, &slot).await {
                    guards.push((name.to_string(), guard));
                    break;
                }
            }
        }

        WriteSet { guards }
    }

    /// Drop the named slots if they never received a point
    ///
    /// Only the given names are inspected. Slots currently locked by a
    /// writer, or holding a series, are left alone.
    pub async fn release<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> usize {
        let mut slots = self.slots.write().await;
        let mut released = 0;

        for name in names {
            let vacant = slots
                .get(name)
                .is_some_and(|slot| slot.try_write().is_ok_and(|guard| guard.is_none()));
            if vacant {
                slots.remove(name);
                released += 1;
            }
        }

        released
    }
}

/// Totals over one multi-series merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub accepted: usize,
    pub created: usize,
    pub series: usize,
}

/// Exclusive access to a set of series for the duration of one merge
///
/// Dropping the set releases every lock at once, so readers observe either
/// none or all of the batches merged through it.
pub struct WriteSet {
    guards: Vec<(String, OwnedRwLockWriteGuard<Option<Series>>)>,
}

impl WriteSet {
    /// Names held by this set, in lock order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.guards.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Names whose slot is still empty
    pub fn vacant_names(&self) -> Vec<String> {
        self.guards
            .iter()
            .filter(|(_, guard)| guard.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.guards
            .binary_search_by(|(held, _)| held.as_str().cmp(name))
            .ok()
    }

    /// Value type of a locked series, `None` if it holds no points yet
    pub fn established_type(&self, name: &str) -> Option<ValueType> {
        let index = self.position(name)?;
        self.guards[index].1.as_ref().map(Series::value_type)
    }

    /// Merge a batch into a locked series, creating it if needed
    ///
    /// Returns `None` when the batch names a series this set does not hold.
    pub fn merge(&mut self, batch: &SeriesBatch) -> Option<MergeOutcome> {
        let index = self.position(&batch.name)?;
        let slot = &mut *self.guards[index].1;

        let series = slot.get_or_insert_with(|| Series::new(batch.name.clone(), batch.value_type));
        Some(series.merge(&batch.points))
    }

    /// Check every batch against its own points and the established series
    /// types, then merge
    ///
    /// Nothing is merged unless every batch passes, so a type mismatch on
    /// one series leaves all others untouched. Batches must name series held
    /// by this set.
    pub fn apply(&mut self, batches: &[SeriesBatch]) -> Result<MergeSummary, ValidationError> {
        let mut pending: HashMap<&str, ValueType> = HashMap::new();
        for batch in batches {
            debug_assert!(self.position(&batch.name).is_some());
            validator::check_batch(batch)?;
            let established = pending
                .get(batch.name.as_str())
                .copied()
                .or_else(|| self.established_type(&batch.name));
            validator::check_established(batch, established)?;
            pending.insert(&batch.name, batch.value_type);
        }

        let mut summary = MergeSummary::default();
        for batch in batches {
            if let Some(outcome) = self.merge(batch) {
                summary.accepted += outcome.accepted;
                summary.created += outcome.created;
                summary.series += 1;
            }
        }
        Ok(summary)
    }
}
