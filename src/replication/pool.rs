//! Pool membership and per-member replication state
//!
//! Each member moves through `Joining -> Transferring -> Consistent`. A
//! member whose bootstrap or delivery fails permanently is `Failed` until
//! its transfer is resumed. The pool status is derived from member states
//! and published on a watch channel so callers can wait for convergence
//! instead of polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{watch, RwLock};

use crate::metrics;

use super::error::ReplicationError;

// ============================================================================
// Member State
// ============================================================================

/// Replication state of one pool member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    /// Registered; bootstrap not started
    Joining,

    /// Receiving the existing series
    Transferring,

    /// Caught up; receives every new insert
    Consistent,

    /// Bootstrap or delivery failed permanently
    Failed,
}

impl MemberState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joining => "joining",
            Self::Transferring => "transferring",
            Self::Consistent => "consistent",
            Self::Failed => "failed",
        }
    }

    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Pool Status
// ============================================================================

/// Externally observable status of the whole pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    /// Every member is consistent
    Running,

    /// At least one member is still joining or transferring
    Synchronizing,

    /// At least one member failed
    Degraded,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Synchronizing => "synchronizing",
            Self::Degraded => "degraded",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    fn derive<'a>(states: impl IntoIterator<Item = &'a MemberState>) -> Self {
        let mut status = Self::Running;
        for state in states {
            match state {
                MemberState::Failed => return Self::Degraded,
                MemberState::Joining | MemberState::Transferring => status = Self::Synchronizing,
                MemberState::Consistent => {}
            }
        }
        status
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Member Info
// ============================================================================

/// Information about a pool member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Member identifier
    pub id: String,

    /// Base URL for remote members
    pub address: Option<String>,

    /// Current replication state
    pub state: MemberState,

    /// When the member was added
    pub joined_at: DateTime<Utc>,

    /// When the member last became consistent
    pub consistent_at: Option<DateTime<Utc>>,

    /// Series in the bootstrap snapshot
    pub series_total: usize,

    /// Series of the snapshot already transferred
    pub series_transferred: usize,

    /// Batches delivered after the snapshot
    pub batches_forwarded: u64,

    /// Deliveries abandoned after exhausting retries
    pub failures: u64,

    /// Error that caused the last failure
    pub last_error: Option<String>,
}

impl MemberInfo {
    pub fn new(id: impl Into<String>, address: Option<String>) -> Self {
        Self {
            id: id.into(),
            address,
            state: MemberState::Joining,
            joined_at: Utc::now(),
            consistent_at: None,
            series_total: 0,
            series_transferred: 0,
            batches_forwarded: 0,
            failures: 0,
            last_error: None,
        }
    }

    pub fn mark_transferring(&mut self, series_total: usize) {
        self.state = MemberState::Transferring;
        self.series_total = series_total;
    }

    pub fn record_transferred(&mut self, count: usize) {
        self.series_transferred = (self.series_transferred + count).min(self.series_total);
    }

    /// Leave `Failed` and pick the transfer up again
    pub fn mark_resumed(&mut self) {
        if self.state == MemberState::Failed {
            self.state = MemberState::Transferring;
        }
    }

    pub fn mark_consistent(&mut self) {
        self.state = MemberState::Consistent;
        self.consistent_at = Some(Utc::now());
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = MemberState::Failed;
        self.failures += 1;
        self.last_error = Some(error.into());
    }

    /// Share of the snapshot transferred, 1.0 when nothing needed copying
    pub fn progress(&self) -> f64 {
        if self.series_total == 0 {
            1.0
        } else {
            self.series_transferred as f64 / self.series_total as f64
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Membership table shared by the replication manager and its workers
pub struct Pool {
    members: RwLock<HashMap<String, MemberInfo>>,
    status: watch::Sender<PoolStatus>,
    max_members: usize,
}

impl Pool {
    pub fn new(max_members: usize) -> Self {
        let (status, _) = watch::channel(PoolStatus::Running);
        Self {
            members: RwLock::new(HashMap::new()),
            status,
            max_members,
        }
    }

    /// Add a member in the `Joining` state
    pub async fn register(
        &self,
        id: &str,
        address: Option<String>,
    ) -> Result<MemberInfo, ReplicationError> {
        let mut members = self.members.write().await;

        if members.contains_key(id) {
            return Err(ReplicationError::DuplicateMember(id.to_string()));
        }
        if members.len() >= self.max_members {
            return Err(ReplicationError::PoolFull {
                max: self.max_members,
            });
        }

        let info = MemberInfo::new(id, address);
        members.insert(id.to_string(), info.clone());
        self.publish(&members);

        Ok(info)
    }

    pub async fn unregister(&self, id: &str) -> Option<MemberInfo> {
        let mut members = self.members.write().await;
        let removed = members.remove(id);
        self.publish(&members);
        removed
    }

    pub async fn get(&self, id: &str) -> Option<MemberInfo> {
        self.members.read().await.get(id).cloned()
    }

    /// All members sorted by id
    pub async fn members(&self) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> = self.members.read().await.values().cloned().collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    /// Ids of members that are not consistent yet, sorted
    pub async fn pending(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .members
            .read()
            .await
            .values()
            .filter(|m| !m.state.is_consistent())
            .map(|m| m.id.clone())
            .collect();
        pending.sort();
        pending
    }

    /// Apply a change to one member and republish the pool status
    pub async fn update(
        &self,
        id: &str,
        change: impl FnOnce(&mut MemberInfo),
    ) -> Result<MemberInfo, ReplicationError> {
        let mut members = self.members.write().await;

        let info = members
            .get_mut(id)
            .ok_or_else(|| ReplicationError::UnknownMember(id.to_string()))?;
        change(info);
        let info = info.clone();

        self.publish(&members);
        Ok(info)
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<PoolStatus> {
        self.status.subscribe()
    }

    fn publish(&self, members: &HashMap<String, MemberInfo>) {
        let next = PoolStatus::derive(members.values().map(|m| &m.state));
        let pending = members.values().filter(|m| !m.state.is_consistent()).count();
        metrics::set_members_pending(pending);

        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!(from = %current, to = %next, "Pool status changed");
            *current = next;
            true
        });
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let members = self.members.read().await;

        let mut stats = PoolStats {
            total_members: members.len(),
            ..Default::default()
        };

        for info in members.values() {
            match info.state {
                MemberState::Joining => stats.joining += 1,
                MemberState::Transferring => stats.transferring += 1,
                MemberState::Consistent => stats.consistent += 1,
                MemberState::Failed => stats.failed += 1,
            }
            stats.batches_forwarded += info.batches_forwarded;
            stats.failures += info.failures;
        }

        stats
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_members: usize,
    pub joining: usize,
    pub transferring: usize,
    pub consistent: usize,
    pub failed: usize,
    pub batches_forwarded: u64,
    pub failures: u64,
}

// ============================================================================
// Series Lookup
// ============================================================================

/// Number of lookup slots series names hash into
pub const LOOKUP_SIZE: usize = 8192;

/// Table assigning lookup slots to pools
///
/// Growing from `n` to `n + 1` pools moves every `(n + 1)`-th slot of each
/// existing pool to the new one, so only a minimal share of series changes
/// pool when the cluster grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLookup {
    table: Vec<u16>,
    pool_count: usize,
}

impl PoolLookup {
    pub fn new(pool_count: u16) -> Self {
        let pool_count = usize::from(pool_count.max(1));
        let mut table = vec![0u16; LOOKUP_SIZE];

        for n in 1..pool_count {
            let mut counters = vec![0usize; n];
            for slot in table.iter_mut() {
                let pool = usize::from(*slot);
                counters[pool] += 1;
                if counters[pool] % (n + 1) == 0 {
                    *slot = n as u16;
                }
            }
        }

        Self { table, pool_count }
    }

    pub fn pool_count(&self) -> usize {
        self.pool_count
    }

    /// Pool responsible for a series
    pub fn pool_for(&self, series: &str) -> u16 {
        self.table[lookup_slot(series)]
    }
}

/// Lookup slot of a series name: byte sum modulo [`LOOKUP_SIZE`]
pub fn lookup_slot(series: &str) -> usize {
    let sum = series
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_add(usize::from(b)));
    sum % LOOKUP_SIZE
}

/// Pool responsible for a series given the number of pools
pub fn pool_for_series(series: &str, pool_count: u16) -> u16 {
    PoolLookup::new(pool_count).pool_for(series)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_derivation() {
        assert_eq!(PoolStatus::derive([]), PoolStatus::Running);
        assert_eq!(
            PoolStatus::derive(&[MemberState::Consistent, MemberState::Transferring]),
            PoolStatus::Synchronizing
        );
        assert_eq!(
            PoolStatus::derive(&[MemberState::Joining, MemberState::Failed]),
            PoolStatus::Degraded
        );
    }

    #[test]
    fn test_member_lifecycle() {
        let mut info = MemberInfo::new("node-1", None);
        assert_eq!(info.state, MemberState::Joining);
        assert_eq!(info.progress(), 1.0);

        info.mark_transferring(4);
        info.record_transferred(2);
        assert!((info.progress() - 0.5).abs() < f64::EPSILON);

        info.mark_failed("connection refused");
        assert_eq!(info.state, MemberState::Failed);
        assert_eq!(info.failures, 1);

        info.mark_consistent();
        assert!(info.state.is_consistent());
        assert!(info.last_error.is_none());
        assert!(info.consistent_at.is_some());
    }

    #[tokio::test]
    async fn test_register_and_status() {
        let pool = Pool::new(4);
        assert_eq!(pool.status(), PoolStatus::Running);

        pool.register("node-1", None).await.unwrap();
        assert_eq!(pool.status(), PoolStatus::Synchronizing);
        assert_eq!(pool.pending().await, vec!["node-1".to_string()]);

        pool.update("node-1", MemberInfo::mark_consistent).await.unwrap();
        assert_eq!(pool.status(), PoolStatus::Running);
        assert!(pool.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_overflow() {
        let pool = Pool::new(1);
        pool.register("node-1", None).await.unwrap();

        assert!(matches!(
            pool.register("node-1", None).await,
            Err(ReplicationError::DuplicateMember(_))
        ));
        assert!(matches!(
            pool.register("node-2", None).await,
            Err(ReplicationError::PoolFull { max: 1 })
        ));
    }

    #[tokio::test]
    async fn test_unregister_restores_status() {
        let pool = Pool::new(4);
        pool.register("node-1", None).await.unwrap();
        pool.update("node-1", |m| m.mark_failed("gone")).await.unwrap();
        assert_eq!(pool.status(), PoolStatus::Degraded);

        assert!(pool.unregister("node-1").await.is_some());
        assert_eq!(pool.status(), PoolStatus::Running);
        assert!(pool.update("node-1", MemberInfo::mark_consistent).await.is_err());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let pool = Pool::new(4);
        let mut rx = pool.subscribe();

        pool.register("node-1", None).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), PoolStatus::Synchronizing);
    }

    #[tokio::test]
    async fn test_stats() {
        let pool = Pool::new(4);
        pool.register("a", None).await.unwrap();
        pool.register("b", None).await.unwrap();
        pool.update("a", MemberInfo::mark_consistent).await.unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.total_members, 2);
        assert_eq!(stats.consistent, 1);
        assert_eq!(stats.joining, 1);
    }

    #[test]
    fn test_single_pool_owns_everything() {
        assert_eq!(pool_for_series("cpu", 1), 0);
        assert_eq!(pool_for_series("", 1), 0);
        assert_eq!(pool_for_series("series float", 0), 0);
    }

    #[test]
    fn test_lookup_slot_is_byte_sum() {
        assert_eq!(lookup_slot("a"), 97);
        assert_eq!(lookup_slot("ab"), 97 + 98);
    }

    #[test]
    fn test_lookup_is_balanced() {
        for pools in 2..6u16 {
            let lookup = PoolLookup::new(pools);
            let mut counts = vec![0usize; usize::from(pools)];
            for slot in &lookup.table {
                counts[usize::from(*slot)] += 1;
            }

            let ideal = LOOKUP_SIZE / usize::from(pools);
            for count in counts {
                assert!(count.abs_diff(ideal) <= ideal / 10, "{pools} pools: {count}");
            }
        }
    }

    #[test]
    fn test_growing_moves_only_to_new_pool() {
        let before = PoolLookup::new(2);
        let after = PoolLookup::new(3);

        for (old, new) in before.table.iter().zip(&after.table) {
            assert!(old == new || *new == 2);
        }
    }
}
