use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::SnapshotEntry;
use tracing::debug;
use url::Url;

use crate::error::SyncError;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self, endpoint: &Url) -> Result<Vec<SnapshotEntry>, SyncError>;
}

/// Fetches the bootstrap snapshot over HTTP(S) as a JSON array.
pub struct HttpSnapshotLoader {
    http: Client,
    timeout: Duration,
}

impl HttpSnapshotLoader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotLoader {
    async fn load(&self, endpoint: &Url) -> Result<Vec<SnapshotEntry>, SyncError> {
        let entries: Vec<SnapshotEntry> = self
            .http
            .get(endpoint.clone())
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| SyncError::BootstrapFailure(err.to_string()))?
            .json()
            .await
            .map_err(|err| SyncError::BootstrapFailure(err.to_string()))?;
        debug!(entries = entries.len(), %endpoint, "snapshot: fetched");
        Ok(entries)
    }
}
