//! Replication across pool members
//!
//! - [`pool`] - membership, member state machine and pool status
//! - [`peer`] - transport to other members (in-process or HTTP)
//! - [`manager`] - propagation of inserts and bootstrap of new members
//! - [`config`] - retry and bootstrap settings

pub mod config;
pub mod error;
pub mod manager;
pub mod peer;
pub mod pool;

pub use config::{ReplicationConfig, ReplicationConfigBuilder};
pub use error::ReplicationError;
pub use manager::{PoolReport, ReplicationManager};
pub use peer::{HttpPeer, LocalPeer, Peer, ReplicatedAck, ReplicatedBatch};
pub use pool::{
    lookup_slot, pool_for_series, MemberInfo, MemberState, Pool, PoolLookup, PoolStats,
    PoolStatus, LOOKUP_SIZE,
};
