//! Sync service client.
//!
//! [`SyncService`] is the transport-independent contract the sync manager
//! talks to. [`HttpSyncService`] implements it against the HTTP backend:
//! - POST {endpoint}/push - Upload a snapshot
//! - GET {endpoint}/pull - Download the remote snapshot (404 = none yet)
//! - GET {endpoint}/last-sync - Time of the backend's last accepted push
//! - POST {endpoint}/resolve - Record a conflict resolution
//!
//! Every implementation must turn "no remote state" into an empty snapshot
//! rather than an error, so the first sync of a fresh device succeeds.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::models::{ConflictItem, Resolution, Snapshot};

/// Per-request timeout applied to every backend call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote side of a sync cycle.
pub trait SyncService: Send + Sync {
    /// Upload a snapshot, replacing the remote state
    fn push(&self, snapshot: &Snapshot) -> impl Future<Output = SyncResult<()>> + Send;

    /// Fetch the remote snapshot, or an empty one if none exists
    fn pull(&self) -> impl Future<Output = SyncResult<Snapshot>> + Send;

    /// Time of the last sync recorded by the backend
    fn last_sync_time(&self) -> impl Future<Output = SyncResult<Option<DateTime<Utc>>>> + Send;

    /// Forward a conflict resolution to the backend
    fn resolve_conflict(
        &self,
        item: &ConflictItem,
        resolution: Resolution,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Last sync response
#[derive(Debug, Deserialize)]
struct LastSyncResponse {
    last_sync: Option<DateTime<Utc>>,
}

/// Resolve request
#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    item: &'a ConflictItem,
    resolution: Resolution,
}

/// HTTP sync backend client
#[derive(Debug, Clone)]
pub struct HttpSyncService {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpSyncService {
    /// Create a client for `endpoint` using the default timeout
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> SyncResult<Self> {
        Self::with_timeout(endpoint, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(SyncError::config("sync endpoint is not configured"));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    /// Turn a non-success response into a service error carrying its body
    async fn check(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::service(status.as_u16(), body))
    }
}

impl SyncService for HttpSyncService {
    async fn push(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let response = self
            .client
            .post(self.url("push"))
            .bearer_auth(&self.token)
            .json(snapshot)
            .send()
            .await?;

        Self::check(response).await?;
        tracing::debug!(checksum = %snapshot.checksum, "Pushed snapshot");
        Ok(())
    }

    async fn pull(&self) -> SyncResult<Snapshot> {
        let response = self
            .client
            .get(self.url("pull"))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("No remote snapshot yet, starting from empty");
            return Ok(Snapshot::empty());
        }

        Self::check(response)
            .await?
            .json::<Snapshot>()
            .await
            .map_err(|e| SyncError::Other(format!("Failed to parse remote snapshot: {}", e)))
    }

    async fn last_sync_time(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let response = self
            .client
            .get(self.url("last-sync"))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let body: LastSyncResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Other(format!("Failed to parse last sync response: {}", e)))?;
        Ok(body.last_sync)
    }

    async fn resolve_conflict(&self, item: &ConflictItem, resolution: Resolution) -> SyncResult<()> {
        let request = ResolveRequest { item, resolution };
        let response = self
            .client
            .post(self.url("resolve"))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
