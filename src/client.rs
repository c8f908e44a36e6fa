//! HTTP client for a seriesdb member
//!
//! Used by the CLI and by [`HttpPeer`](crate::replication::HttpPeer) to
//! forward replicated batches.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::insert::response::{ErrorResponse, InsertResponse};
use crate::models::{Point, SeriesInfo};
use crate::replication::{MemberInfo, PoolReport, ReplicatedAck, ReplicatedBatch};
use crate::utils::retry::{with_retry_if, RetryConfig};

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Member base URL, e.g. `http://127.0.0.1:9020`
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,

    /// Retry policy for idempotent reads
    pub retry: RetryConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Body of `POST /pool/members`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub id: String,
    pub url: String,
    /// Member already holds this member's data; skip the bootstrap
    #[serde(default)]
    pub synced: bool,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub member: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ============================================================================
// Client
// ============================================================================

/// Client for one seriesdb member
#[derive(Debug, Clone)]
pub struct SeriesDbClient {
    config: ClientConfig,
    http_client: Client,
}

impl SeriesDbClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Insert points; a rejected request yields [`ClientError::Rejected`]
    pub async fn insert(&self, body: &serde_json::Value) -> Result<InsertResponse, ClientError> {
        let url = self.url("/insert");
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()));
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(error) if status == 400 => Err(ClientError::Rejected(error.error_msg)),
            _ => Err(ClientError::Http {
                status,
                message: text,
            }),
        }
    }

    /// Metadata of every series
    pub async fn list_series(&self) -> Result<Vec<SeriesInfo>, ClientError> {
        self.get_with_retry("/series").await
    }

    /// Points of a series in ascending timestamp order
    pub async fn query(&self, series: &str) -> Result<Vec<Point>, ClientError> {
        let path = format!("/series/{}", urlencode(series));
        self.get_with_retry(&path).await
    }

    pub async fn pool_status(&self) -> Result<PoolReport, ClientError> {
        self.get_with_retry("/pool/status").await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get_with_retry("/health").await
    }

    /// Ask the member to add another member to its pool
    pub async fn add_member(&self, id: &str, url: &str) -> Result<MemberInfo, ClientError> {
        let request = AddMemberRequest {
            id: id.to_string(),
            url: url.to_string(),
            synced: false,
        };
        self.send(self.http_client.post(self.url("/pool/members")).json(&request))
            .await
    }

    /// Deliver a replicated batch; retries are left to the caller
    pub async fn apply_replicated(
        &self,
        batch: &ReplicatedBatch,
    ) -> Result<ReplicatedAck, ClientError> {
        self.send(
            self.http_client
                .post(self.url("/replication/apply"))
                .json(batch),
        )
        .await
    }

    // Internal: GET request with retry on transient failures
    async fn get_with_retry<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        let url = url.as_str();
        let client = self;

        with_retry_if(
            &self.config.retry,
            move |_| client.send(client.http_client.get(url)),
            ClientError::is_transient,
        )
        .await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await.map_err(ClientError::from_reqwest)?;

        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error_msg)
                .unwrap_or(text);
            Err(ClientError::Http { status, message })
        }
    }
}

fn urlencode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

// ============================================================================
// Errors
// ============================================================================

/// Client errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Client initialization failed: {0}")]
    Init(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Insert refused by validation
    #[error("{0}")]
    Rejected(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ClientError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }

    /// Whether the request may succeed when sent again
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Init(_) | Self::Rejected(_) | Self::Parse(_) => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
