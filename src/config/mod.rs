//! Configuration management for seriesdb
//!
//! Loaded from a TOML file or from `SERIESDB_*` environment variables.
//! Every section falls back to its defaults when omitted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

pub use crate::replication::config::{ReplicationConfig, ReplicationConfigBuilder};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Replication configuration
    pub replication: ReplicationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Id of this pool member
    pub member_id: String,

    /// Enable CORS for the API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 9020)),
            member_id: String::from("seriesdb-0"),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse("SERIESDB_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Ok(id) = std::env::var("SERIESDB_MEMBER_ID") {
            config.server.member_id = id;
        }
        if let Some(enable) = env_parse("SERIESDB_ENABLE_CORS") {
            config.server.enable_cors = enable;
        }

        let replication = &mut config.replication;
        if let Some(retries) = env_parse("SERIESDB_MAX_RETRIES") {
            replication.max_retries = retries;
        }
        if let Some(ms) = env_parse("SERIESDB_BASE_DELAY_MS") {
            replication.base_delay_ms = ms;
        }
        if let Some(ms) = env_parse("SERIESDB_MAX_DELAY_MS") {
            replication.max_delay_ms = ms;
        }
        if let Some(size) = env_parse("SERIESDB_BOOTSTRAP_CHUNK_SIZE") {
            replication.bootstrap_chunk_size = size;
        }
        if let Some(ms) = env_parse("SERIESDB_SETTLE_TIMEOUT_MS") {
            replication.settle_timeout_ms = ms;
        }
        if let Some(secs) = env_parse("SERIESDB_PEER_TIMEOUT") {
            replication.peer_timeout_secs = secs;
        }

        if let Ok(level) = std::env::var("SERIESDB_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("SERIESDB_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.member_id.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "server.member_id".to_string(),
            });
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "logging.format".to_string(),
                reason: format!("Unknown format '{}', expected text or json", self.logging.format),
            });
        }

        self.replication.validate()
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}
