//! One pool member: its store, insert pipeline and replication

use std::sync::Arc;

use crate::config::Config;
use crate::insert::{InsertAck, InsertError, InsertService};
use crate::replication::{
    LocalPeer, MemberInfo, ReplicationConfig, ReplicationError, ReplicationManager,
};
use crate::storage::SeriesStore;

/// A pool member
pub struct Node {
    id: String,
    store: Arc<SeriesStore>,
    replication: Arc<ReplicationManager>,
    inserts: Arc<InsertService>,
}

impl Node {
    pub fn new(id: impl Into<String>, config: ReplicationConfig) -> Self {
        let id = id.into();
        let store = Arc::new(SeriesStore::new());
        let replication = Arc::new(ReplicationManager::new(id.clone(), config, store.clone()));
        let inserts = Arc::new(InsertService::new(store.clone(), replication.clone()));

        Self {
            id,
            store,
            replication,
            inserts,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.server.member_id.clone(), config.replication.clone())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<SeriesStore> {
        &self.store
    }

    pub fn replication(&self) -> &Arc<ReplicationManager> {
        &self.replication
    }

    pub fn inserts(&self) -> &Arc<InsertService> {
        &self.inserts
    }

    /// Insert a decoded JSON request
    pub async fn insert(&self, body: &serde_json::Value) -> Result<InsertAck, InsertError> {
        self.inserts.insert(body).await
    }

    /// Handle for replicating to this node from another node in the process
    pub fn local_peer(&self) -> LocalPeer {
        LocalPeer::new(self.id.clone(), self.inserts.clone())
    }

    /// Add an in-process replica to this node's pool
    ///
    /// The replica receives a copy of every existing series and then every
    /// insert made here; inserts made on the replica flow back to this node.
    pub async fn add_replica(&self, replica: &Node) -> Result<MemberInfo, ReplicationError> {
        let info = self.replication.add_member(Arc::new(replica.local_peer())).await?;

        if let Err(e) = replica
            .replication
            .add_synced_member(Arc::new(self.local_peer()))
            .await
        {
            // Keep both pools in step
            self.replication.remove_member(replica.id()).await?;
            return Err(e);
        }

        Ok(info)
    }
}
