//! Replication error types

use thiserror::Error;

use super::pool::PoolStatus;

/// Errors raised by propagation, bootstrap and pool membership changes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplicationError {
    /// Peer unreachable or slow; retried with backoff
    #[error("member '{member}' unreachable: {message}")]
    Transient { member: String, message: String },

    /// Peer answered but refused the batch
    #[error("member '{member}' rejected replicated batch ({status}): {message}")]
    PeerRejected {
        member: String,
        status: u16,
        message: String,
    },

    /// Pool has not converged yet
    #[error("bootstrap incomplete: pool is {status}, waiting on {pending:?}")]
    BootstrapIncomplete {
        status: PoolStatus,
        pending: Vec<String>,
    },

    #[error("unknown pool member: {0}")]
    UnknownMember(String),

    #[error("member already in pool: {0}")]
    DuplicateMember(String),

    #[error("pool is full: at most {max} members")]
    PoolFull { max: usize },

    #[error("invalid member address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("replication to '{0}' was cancelled")]
    Cancelled(String),
}

impl ReplicationError {
    pub fn transient(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            member: member.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
