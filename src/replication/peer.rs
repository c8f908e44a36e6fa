//! Transport seam between this member and the other pool members

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::client::{ClientConfig, ClientError, SeriesDbClient};
use crate::insert::InsertService;
use crate::models::SeriesBatch;

use super::error::ReplicationError;

/// Batches forwarded from one member to another
///
/// Carries already validated series batches. `sequence` is per origin and
/// per destination, increasing in delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedBatch {
    pub origin: String,
    pub sequence: u64,
    pub series: Vec<SeriesBatch>,
}

impl ReplicatedBatch {
    pub fn point_count(&self) -> usize {
        self.series.iter().map(SeriesBatch::len).sum()
    }
}

/// Acknowledgment for an applied replicated batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedAck {
    pub applied: usize,
}

/// A pool member this node replicates to
#[async_trait]
pub trait Peer: Send + Sync {
    fn id(&self) -> &str;

    /// Base URL for remote members
    fn address(&self) -> Option<String> {
        None
    }

    /// Merge a batch on the member without further propagation
    async fn apply(&self, batch: &ReplicatedBatch) -> Result<ReplicatedAck, ReplicationError>;
}

/// Member running in the same process
pub struct LocalPeer {
    id: String,
    inserts: Arc<InsertService>,
}

impl LocalPeer {
    pub fn new(id: impl Into<String>, inserts: Arc<InsertService>) -> Self {
        Self {
            id: id.into(),
            inserts,
        }
    }
}

#[async_trait]
impl Peer for LocalPeer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn apply(&self, batch: &ReplicatedBatch) -> Result<ReplicatedAck, ReplicationError> {
        self.inserts
            .apply_replicated(batch)
            .await
            .map(|applied| ReplicatedAck { applied })
            .map_err(|e| ReplicationError::PeerRejected {
                member: self.id.clone(),
                status: 400,
                message: e.to_string(),
            })
    }
}

/// Member reached over HTTP
pub struct HttpPeer {
    id: String,
    client: SeriesDbClient,
}

impl HttpPeer {
    /// Create a peer for the member serving at `url`
    pub fn new(id: impl Into<String>, config: ClientConfig) -> Result<Self, ReplicationError> {
        let id = id.into();
        let address = config.base_url.clone();

        let url = url::Url::parse(&address).map_err(|e| ReplicationError::InvalidAddress {
            address: address.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ReplicationError::InvalidAddress {
                address,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let client = SeriesDbClient::new(config).map_err(|e| ReplicationError::InvalidAddress {
            address,
            reason: e.to_string(),
        })?;

        Ok(Self { id, client })
    }

    fn map_error(&self, error: ClientError) -> ReplicationError {
        match error {
            ClientError::Http { status, message } if status < 500 && status != 429 => {
                ReplicationError::PeerRejected {
                    member: self.id.clone(),
                    status,
                    message,
                }
            }
            other => ReplicationError::transient(&self.id, other.to_string()),
        }
    }
}

#[async_trait]
impl Peer for HttpPeer {
    fn id(&self) -> &str {
        &self.id
    }

    fn address(&self) -> Option<String> {
        Some(self.client.base_url().to_string())
    }

    async fn apply(&self, batch: &ReplicatedBatch) -> Result<ReplicatedAck, ReplicationError> {
        self.client
            .apply_replicated(batch)
            .await
            .map_err(|e| self.map_error(e))
    }
}
