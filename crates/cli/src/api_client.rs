use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let req = if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        };
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let body = self.send(req).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/v1/health")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn prune(&self, req: &PruneRequest) -> Result<PruneReport> {
        let mut url = self.url("/v1/data-management/prune")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("dry_run", &req.dry_run.to_string());
            if let Some(limit) = req.limit {
                query.append_pair("limit", &limit.to_string());
            }
            if let Some(batch_size) = req.batch_size {
                query.append_pair("batch_size", &batch_size.to_string());
            }
        }
        self.send_json(self.http.post(url)).await
    }

    /// Start an archive export. The body is left unread so the caller can
    /// stream it.
    pub async fn export_dog(&self, dog_id: &str) -> Result<reqwest::Response> {
        let url = self.url("/v1/dogs/export")?;
        self.send(self.http.post(url).json(&ExportRequest {
            dog_id: dog_id.to_string(),
        }))
        .await
    }
}

// =============================================================================
// Request/response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(default)]
    pub storage_backend: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PruneRequest {
    pub dry_run: bool,
    pub limit: Option<u64>,
    pub batch_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExportRequest {
    pub dog_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeletionError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BucketDeletionResult {
    pub bucket: String,
    pub attempted: u64,
    pub deleted: u64,
    pub errors: Vec<DeletionError>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PruneReport {
    pub dry_run: bool,
    pub examined_objects: u64,
    pub referenced_objects: u64,
    pub orphaned_objects: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_orphans: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<BucketDeletionResult>>,
    #[serde(default)]
    pub truncated: bool,
}

impl PruneReport {
    pub fn orphan_total(&self) -> u64 {
        self.orphaned_objects.values().sum()
    }

    pub fn deleted_total(&self) -> u64 {
        self.results
            .iter()
            .flatten()
            .map(|result| result.deleted)
            .sum()
    }

    pub fn error_total(&self) -> usize {
        self.results
            .iter()
            .flatten()
            .map(|result| result.errors.len())
            .sum()
    }
}
