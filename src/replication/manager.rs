//! Propagation of inserts to pool members and bootstrap of new members
//!
//! Each member gets a worker task fed by an unbounded queue. Inserts are
//! queued while their series locks are still held, so every member sees the
//! writes to one series in the order they were merged locally.
//!
//! Bootstrap of a new member:
//!
//! 1. The member's queue is registered before anything is read, so every
//!    insert merged from then on is queued for it.
//! 2. The worker copies the existing series in chunks. Each series is read
//!    when its chunk is sent, which may already include queued writes.
//! 3. The worker replays its queue. Replays of points the snapshot already
//!    carried overwrite them with the same or a later value, so the member
//!    ends up identical to this one.
//! 4. The member is marked `Consistent`.
//!
//! A delivery that keeps failing transiently marks the member `Failed`.
//! Nothing is dropped: the worker parks until
//! [`ReplicationManager::resume_bootstrap`] and then retries where it stopped.
//!
//! A delivery the member refuses outright, such as a type conflict with data
//! it already holds, would fail the same way on every retry. The worker
//! records the failure, remembers the series involved and moves on, so the
//! rest of the queue keeps flowing while the pool reports `Degraded`. A
//! resume re-sends the current contents of those series.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::models::SeriesBatch;
use crate::storage::SeriesStore;
use crate::utils::retry::{with_retry_if, RetryConfig};

use super::config::ReplicationConfig;
use super::error::ReplicationError;
use super::peer::{Peer, ReplicatedBatch};
use super::pool::{MemberInfo, MemberState, Pool, PoolStats, PoolStatus};

type Delivery = Arc<Vec<SeriesBatch>>;

/// Queue and worker of one member
struct MemberLink {
    queue: mpsc::UnboundedSender<Delivery>,
    resume: Arc<Notify>,
    worker: JoinHandle<()>,
}

/// Snapshot of the pool as seen by this member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolReport {
    pub member: String,
    pub status: PoolStatus,
    pub members: Vec<MemberInfo>,
    pub stats: PoolStats,
}

/// Keeps the other pool members converged with this one
pub struct ReplicationManager {
    member_id: String,
    config: ReplicationConfig,
    store: Arc<SeriesStore>,
    pool: Arc<Pool>,
    links: RwLock<HashMap<String, MemberLink>>,
}

impl ReplicationManager {
    pub fn new(
        member_id: impl Into<String>,
        config: ReplicationConfig,
        store: Arc<SeriesStore>,
    ) -> Self {
        let pool = Arc::new(Pool::new(config.max_members));
        Self {
            member_id: member_id.into(),
            config,
            store,
            pool,
            links: RwLock::new(HashMap::new()),
        }
    }

    /// Id of this member
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Enroll a member and start copying the existing series to it
    pub async fn add_member(&self, peer: Arc<dyn Peer>) -> Result<MemberInfo, ReplicationError> {
        self.enroll(peer, true).await
    }

    /// Enroll a member that already holds every series of this one
    ///
    /// The member is consistent immediately and only receives new inserts.
    pub async fn add_synced_member(
        &self,
        peer: Arc<dyn Peer>,
    ) -> Result<MemberInfo, ReplicationError> {
        self.enroll(peer, false).await
    }

    async fn enroll(
        &self,
        peer: Arc<dyn Peer>,
        bootstrap: bool,
    ) -> Result<MemberInfo, ReplicationError> {
        let id = peer.id().to_string();
        let info = self.pool.register(&id, peer.address()).await?;

        let (queue, receiver) = mpsc::unbounded_channel();
        let resume = Arc::new(Notify::new());

        let worker = MemberWorker {
            origin: self.member_id.clone(),
            peer,
            pool: self.pool.clone(),
            store: self.store.clone(),
            retry: self.config.retry_config(),
            chunk_size: self.config.bootstrap_chunk_size,
            resume: resume.clone(),
            sequence: 0,
            cursor: 0,
            snapshot: None,
            steady: false,
            diverged: BTreeSet::new(),
        };

        // Registered before the worker reads the store, see module docs
        {
            let mut links = self.links.write().unwrap_or_else(PoisonError::into_inner);
            let handle = tokio::spawn(worker.run(receiver, bootstrap));
            links.insert(
                id.clone(),
                MemberLink {
                    queue,
                    resume,
                    worker: handle,
                },
            );
        }

        info!(member = %id, bootstrap, "Pool member added");
        Ok(info)
    }

    /// Stop replicating to a member and forget it
    pub async fn remove_member(&self, id: &str) -> Result<MemberInfo, ReplicationError> {
        let link = self
            .links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(link) = link {
            link.worker.abort();
        }

        let removed = self
            .pool
            .unregister(id)
            .await
            .ok_or_else(|| ReplicationError::UnknownMember(id.to_string()))?;

        info!(member = %id, "Pool member removed");
        Ok(removed)
    }

    /// Restart the transfer to a failed member where it stopped
    ///
    /// A member that is not failed is left as it is and its worker is not
    /// woken.
    pub async fn resume_bootstrap(&self, id: &str) -> Result<MemberInfo, ReplicationError> {
        let resume = self
            .links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|link| link.resume.clone())
            .ok_or_else(|| ReplicationError::UnknownMember(id.to_string()))?;

        let mut failed = false;
        let info = self
            .pool
            .update(id, |member| {
                failed = member.state == MemberState::Failed;
                member.mark_resumed();
            })
            .await?;
        if !failed {
            debug!(member = %id, state = %info.state, "Member not failed, nothing to resume");
            return Ok(info);
        }
        resume.notify_one();

        info!(member = %id, state = %info.state, "Replication resumed");
        Ok(info)
    }

    /// Queue batches that were just merged locally for every member
    ///
    /// Must be called while the series locks of the merge are still held.
    /// Never blocks and never fails the caller.
    pub fn propagate(&self, batches: &[SeriesBatch]) {
        if batches.is_empty() {
            return;
        }

        let links = self.links.read().unwrap_or_else(PoisonError::into_inner);
        if links.is_empty() {
            return;
        }

        let delivery: Delivery = Arc::new(batches.to_vec());
        for (id, link) in links.iter() {
            if link.queue.send(delivery.clone()).is_err() {
                warn!(member = %id, "Replication worker stopped, batch not queued");
            }
        }
    }

    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub async fn report(&self) -> PoolReport {
        PoolReport {
            member: self.member_id.clone(),
            status: self.pool.status(),
            members: self.pool.members().await,
            stats: self.pool.stats().await,
        }
    }

    /// Fail with `BootstrapIncomplete` unless every member is consistent
    pub async fn ensure_running(&self) -> Result<(), ReplicationError> {
        let status = self.pool.status();
        if status.is_running() {
            return Ok(());
        }
        Err(ReplicationError::BootstrapIncomplete {
            status,
            pending: self.pool.pending().await,
        })
    }

    /// Wait until every member is consistent
    ///
    /// Uses the configured settle timeout when `timeout` is `None`.
    pub async fn wait_until_running(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), ReplicationError> {
        let timeout = timeout.unwrap_or_else(|| self.config.settle_timeout());
        let mut status = self.pool.subscribe();

        let settled = tokio::time::timeout(timeout, status.wait_for(PoolStatus::is_running))
            .await
            .map(|result| result.is_ok());

        match settled {
            Ok(true) => Ok(()),
            Ok(false) => Err(ReplicationError::Cancelled(self.member_id.clone())),
            Err(_) => {
                let status = self.pool.status();
                let pending = self.pool.pending().await;
                warn!(%status, ?pending, timeout_ms = timeout.as_millis(), "Pool did not settle in time");
                Err(ReplicationError::BootstrapIncomplete { status, pending })
            }
        }
    }

    /// Abort every worker; queued deliveries are dropped
    pub fn shutdown(&self) {
        let mut links = self.links.write().unwrap_or_else(PoisonError::into_inner);
        for (id, link) in links.drain() {
            link.worker.abort();
            debug!(member = %id, "Replication worker stopped");
        }
    }
}

impl Drop for ReplicationManager {
    fn drop(&mut self) {
        let links = self.links.get_mut().unwrap_or_else(PoisonError::into_inner);
        for link in links.values() {
            link.worker.abort();
        }
    }
}

// ============================================================================
// Member Worker
// ============================================================================

struct MemberWorker {
    origin: String,
    peer: Arc<dyn Peer>,
    pool: Arc<Pool>,
    store: Arc<SeriesStore>,
    retry: RetryConfig,
    chunk_size: usize,
    resume: Arc<Notify>,
    sequence: u64,
    /// Series of the snapshot already transferred
    cursor: usize,
    snapshot: Option<Vec<String>>,
    /// Caught up once; later failures only affect single deliveries
    steady: bool,
    /// Series with a refused delivery, re-sent on resume
    diverged: BTreeSet<String>,
}

impl MemberWorker {
    fn id(&self) -> &str {
        self.peer.id()
    }

    async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Delivery>, bootstrap: bool) {
        if bootstrap {
            while let Err(e) = self.transfer().await {
                self.park(&e).await;
            }
            info!(member = %self.id(), series = self.cursor, "Bootstrap transfer complete");
        }

        // Catch up on inserts queued during the transfer
        while let Ok(delivery) = queue.try_recv() {
            self.forward(&delivery).await;
        }
        self.steady = true;
        self.settle().await;

        let resume = self.resume.clone();
        loop {
            tokio::select! {
                delivery = queue.recv() => match delivery {
                    Some(delivery) => self.forward(&delivery).await,
                    None => break,
                },
                () = resume.notified() => self.repair().await,
            }
        }
        debug!(member = %self.id(), "Replication queue closed");
    }

    /// Copy the snapshot from the cursor on
    async fn transfer(&mut self) -> Result<(), ReplicationError> {
        let names = match self.snapshot.take() {
            Some(names) => names,
            None => self.store.names().await,
        };

        let total = names.len();
        self.update(|m| m.mark_transferring(total)).await;
        debug!(member = %self.id(), series = total, from = self.cursor, "Transferring series");

        let result = self.transfer_from(&names).await;
        self.snapshot = Some(names);
        result
    }

    async fn transfer_from(&mut self, names: &[String]) -> Result<(), ReplicationError> {
        while self.cursor < names.len() {
            let end = (self.cursor + self.chunk_size).min(names.len());
            let chunk = &names[self.cursor..end];

            let mut series = Vec::with_capacity(chunk.len());
            for name in chunk {
                if let Some(batch) = self.store.export(name).await {
                    series.push(batch);
                }
            }
            let delivered = if series.is_empty() {
                true
            } else {
                match self.deliver(series).await {
                    Ok(()) => true,
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => {
                        self.divert(chunk.iter().cloned(), &e).await;
                        false
                    }
                }
            };

            self.cursor = end;
            if delivered {
                let count = chunk.len();
                metrics::record_series_transferred(self.peer.id(), count);
                self.update(|m| m.record_transferred(count)).await;
            }
        }
        Ok(())
    }

    /// Deliver one queued insert
    ///
    /// Transient failures park the worker until the insert goes through. A
    /// refused insert is recorded and skipped.
    async fn forward(&mut self, delivery: &Delivery) {
        let mut recovered = false;
        loop {
            match self.deliver(delivery.as_ref().clone()).await {
                Ok(()) => {
                    metrics::record_batch_forwarded(self.peer.id());
                    self.update(|m| m.batches_forwarded += 1).await;
                    if recovered && self.steady {
                        self.settle().await;
                    }
                    return;
                }
                Err(e) if e.is_transient() => {
                    self.park(&e).await;
                    recovered = true;
                }
                Err(e) => {
                    self.divert(delivery.iter().map(|b| b.name.clone()), &e).await;
                    return;
                }
            }
        }
    }

    /// Re-send the full contents of every series with a refused delivery
    async fn repair(&mut self) {
        let names: Vec<String> = std::mem::take(&mut self.diverged).into_iter().collect();
        if !names.is_empty() {
            info!(member = %self.id(), series = names.len(), "Re-sending refused series");
        }

        for chunk in names.chunks(self.chunk_size) {
            let mut series = Vec::with_capacity(chunk.len());
            for name in chunk {
                if let Some(batch) = self.store.export(name).await {
                    series.push(batch);
                }
            }
            if series.is_empty() {
                continue;
            }
            if let Err(e) = self.deliver(series).await {
                self.divert(chunk.iter().cloned(), &e).await;
            }
        }

        self.settle().await;
    }

    async fn deliver(&mut self, series: Vec<SeriesBatch>) -> Result<(), ReplicationError> {
        self.sequence += 1;
        let batch = ReplicatedBatch {
            origin: self.origin.clone(),
            sequence: self.sequence,
            series,
        };

        let peer = self.peer.as_ref();
        let batch = &batch;
        let ack = with_retry_if(
            &self.retry,
            move |attempt| {
                if attempt > 0 {
                    metrics::record_replication_retry(peer.id());
                }
                peer.apply(batch)
            },
            ReplicationError::is_transient,
        )
        .await?;

        debug!(
            member = %self.peer.id(),
            sequence = batch.sequence,
            points = ack.applied,
            "Batch replicated"
        );
        Ok(())
    }

    /// Mark the member failed and wait for a resume
    async fn park(&self, error: &ReplicationError) {
        warn!(member = %self.id(), error = %error, "Replication failed, waiting for resume");
        metrics::record_replication_failure(self.peer.id());

        let message = error.to_string();
        self.update(|m| m.mark_failed(message)).await;
        self.resume.notified().await;

        info!(member = %self.id(), "Resuming replication");
    }

    /// Record a refused delivery without waiting for a resume
    async fn divert(&mut self, names: impl IntoIterator<Item = String>, error: &ReplicationError) {
        warn!(member = %self.id(), error = %error, "Delivery refused, series re-sent on resume");
        metrics::record_replication_failure(self.peer.id());

        self.diverged.extend(names);
        let message = error.to_string();
        self.update(|m| m.mark_failed(message)).await;
    }

    /// Consistent once no series awaits a re-send, failed otherwise
    async fn settle(&self) {
        if self.diverged.is_empty() {
            self.update(MemberInfo::mark_consistent).await;
        } else {
            self.update(|m| m.state = MemberState::Failed).await;
        }
    }

    async fn update(&self, change: impl FnOnce(&mut MemberInfo)) {
        // The member may have been removed while this worker was running
        if let Err(e) = self.pool.update(self.peer.id(), change).await {
            debug!(member = %self.id(), error = %e, "Member state not updated");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
