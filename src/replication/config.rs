//! Replication configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ConfigError;
use crate::utils::retry::RetryConfig;

/// Configuration for propagation and bootstrap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Delivery attempts after the first before a member is marked failed
    pub max_retries: u32,

    /// Base delay in milliseconds between delivery attempts
    pub base_delay_ms: u64,

    /// Cap on the delay between delivery attempts
    pub max_delay_ms: u64,

    /// Series sent per bootstrap transfer request
    pub bootstrap_chunk_size: usize,

    /// How long a member may take to become consistent after joining
    pub settle_timeout_ms: u64,

    /// Timeout for one request to a remote member
    pub peer_timeout_secs: u64,

    /// Maximum number of members besides this one
    pub max_members: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            bootstrap_chunk_size: 64,
            settle_timeout_ms: 3_000,
            peer_timeout_secs: 10,
            max_members: 16,
        }
    }
}

impl ReplicationConfig {
    /// Create a new config builder
    pub fn builder() -> ReplicationConfigBuilder {
        ReplicationConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "base_delay_ms".to_string(),
                reason: "Base delay must not exceed max delay".to_string(),
            });
        }

        if self.bootstrap_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bootstrap_chunk_size".to_string(),
                reason: "Must transfer at least 1 series per chunk".to_string(),
            });
        }

        if self.settle_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "settle_timeout_ms".to_string(),
                reason: "Settle timeout must be positive".to_string(),
            });
        }

        if self.peer_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "peer_timeout_secs".to_string(),
                reason: "Peer timeout must be positive".to_string(),
            });
        }

        if self.max_members == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_members".to_string(),
                reason: "Must allow at least 1 member".to_string(),
            });
        }

        Ok(())
    }

    /// Retry policy for deliveries to one member
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_retries, self.base_delay_ms, self.max_delay_ms)
    }

    #[must_use]
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    #[must_use]
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

/// Builder for ReplicationConfig
#[derive(Debug, Default)]
pub struct ReplicationConfigBuilder {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    bootstrap_chunk_size: Option<usize>,
    settle_timeout_ms: Option<u64>,
    peer_timeout_secs: Option<u64>,
    max_members: Option<usize>,
}

impl ReplicationConfigBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set base and max delay between attempts
    pub fn delays(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_delay_ms = Some(base_ms);
        self.max_delay_ms = Some(max_ms);
        self
    }

    pub fn bootstrap_chunk_size(mut self, size: usize) -> Self {
        self.bootstrap_chunk_size = Some(size);
        self
    }

    pub fn settle_timeout_ms(mut self, ms: u64) -> Self {
        self.settle_timeout_ms = Some(ms);
        self
    }

    pub fn peer_timeout_secs(mut self, secs: u64) -> Self {
        self.peer_timeout_secs = Some(secs);
        self
    }

    pub fn max_members(mut self, max: usize) -> Self {
        self.max_members = Some(max);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ReplicationConfig, ConfigError> {
        let defaults = ReplicationConfig::default();
        let config = ReplicationConfig {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            base_delay_ms: self.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            bootstrap_chunk_size: self
                .bootstrap_chunk_size
                .unwrap_or(defaults.bootstrap_chunk_size),
            settle_timeout_ms: self.settle_timeout_ms.unwrap_or(defaults.settle_timeout_ms),
            peer_timeout_secs: self.peer_timeout_secs.unwrap_or(defaults.peer_timeout_secs),
            max_members: self.max_members.unwrap_or(defaults.max_members),
        };

        config.validate()?;
        Ok(config)
    }
}
