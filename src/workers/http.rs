//! JSON-over-HTTP transport for a remote worker service.
//!
//! Every stage is a `POST` of the request struct as JSON to one endpoint
//! under a base URL. The service answers with the response fields plus a
//! `success` flag and, on failure, an `error` message:
//!
//! ```text
//! POST {base}/api/process-chunk  {"sessionId": "...", "chunkIndex": 2, ...}
//!   ◀── {"success": true, "processedChunkPath": "job-1/processed/0002.pdf"}
//!   ◀── {"success": false, "error": "font not embedded"}
//! ```
//!
//! Timeouts belong here, not to the orchestrator: a request that exceeds
//! `timeout_secs` surfaces as [`WorkerError::Transport`].

use super::{
    DirectProcessor, DirectResponse, MergeRequest, MergeResponse, MergingWorker, RenderRequest,
    RenderResponse, RenderingWorker, SliceRequest, SliceResponse, SlicingWorker, SplitRequest,
    SplitResponse, SplittingWorker,
};
use crate::error::{PipelineError, WorkerError};
use crate::job::JobRequest;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Endpoint paths, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoints {
    pub slice: String,
    pub split: String,
    pub render: String,
    pub merge: String,
    pub direct: String,
    pub health: String,
}

impl Default for WorkerEndpoints {
    fn default() -> Self {
        Self {
            slice: "/api/slice-images".into(),
            split: "/api/split-pdf".into(),
            render: "/api/process-chunk".into(),
            merge: "/api/merge-pdfs".into(),
            direct: "/api/process-pdf".into(),
            health: "/health".into(),
        }
    }
}

/// Connection settings for [`HttpWorkers`].
#[derive(Debug, Clone)]
pub struct HttpWorkerConfig {
    /// e.g. `https://workers.example.com`. A trailing `/` is ignored.
    pub base_url: String,
    /// Per-request timeout in seconds. Default: 300.
    pub timeout_secs: u64,
    pub endpoints: WorkerEndpoints,
}

impl HttpWorkerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 300,
            endpoints: WorkerEndpoints::default(),
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }
}

/// HTTP client implementing every worker trait.
#[derive(Debug, Clone)]
pub struct HttpWorkers {
    client: reqwest::Client,
    config: HttpWorkerConfig,
}

impl HttpWorkers {
    pub fn new(config: HttpWorkerConfig) -> Result<Self, PipelineError> {
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(PipelineError::InvalidConfig(format!(
                "worker base URL must be http:// or https://, got '{}'",
                config.base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, endpoint: &str) -> String {
        join_url(&self.config.base_url, endpoint)
    }

    /// Check the worker service answers `{"status": "healthy"}`.
    pub async fn health(&self) -> Result<(), WorkerError> {
        let url = self.url(&self.config.endpoints.health);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        if !response.status().is_success() {
            return Err(WorkerError::Transport(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WorkerError::Decode(format!("{url}: {e}")))?;
        match body.get("status").and_then(|s| s.as_str()) {
            Some("healthy") => Ok(()),
            other => Err(WorkerError::Rejected(format!(
                "{url}: unhealthy status {other:?}"
            ))),
        }
    }

    async fn post<Req, Resp>(&self, endpoint: &str, request: &Req) -> Result<Resp, WorkerError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(endpoint);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&url, e))?;

        // Failures usually still carry a JSON body with the worker's message.
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(body) => decode_reply(&url, status, body),
            Err(_) if !status.is_success() => {
                warn!("{} answered HTTP {} with a non-JSON body", url, status);
                Err(WorkerError::Transport(format!(
                    "{url}: HTTP {status}: {}",
                    truncate(&text, 200)
                )))
            }
            Err(e) => Err(WorkerError::Decode(format!("{url}: {e}"))),
        }
    }
}

/// Check the HTTP status before the envelope: a failing worker may answer
/// `{"error": "..."}` with no `success` field at all.
fn decode_reply<Resp: DeserializeOwned>(
    url: &str,
    status: reqwest::StatusCode,
    body: serde_json::Value,
) -> Result<Resp, WorkerError> {
    if status.is_success() {
        return decode_envelope(body);
    }
    match body.get("error").and_then(|e| e.as_str()) {
        Some(message) => Err(WorkerError::Rejected(message.to_string())),
        None => {
            warn!("{} answered HTTP {} without an error message", url, status);
            Err(WorkerError::Transport(format!(
                "{url}: HTTP {status}: {}",
                truncate(&body.to_string(), 200)
            )))
        }
    }
}

/// Turn a `{"success": bool, "error"?: str, ...fields}` body into the
/// typed response or a [`WorkerError::Rejected`].
fn decode_envelope<Resp: DeserializeOwned>(body: serde_json::Value) -> Result<Resp, WorkerError> {
    let success = body
        .get("success")
        .and_then(|s| s.as_bool())
        .ok_or_else(|| WorkerError::Decode("response has no boolean 'success' field".into()))?;
    if !success {
        let message = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unspecified worker error")
            .to_string();
        return Err(WorkerError::Rejected(message));
    }
    serde_json::from_value(body).map_err(|e| WorkerError::Decode(e.to_string()))
}

fn transport_error(url: &str, e: reqwest::Error) -> WorkerError {
    if e.is_timeout() {
        WorkerError::Transport(format!("{url}: timed out"))
    } else {
        WorkerError::Transport(format!("{url}: {e}"))
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[async_trait]
impl SlicingWorker for HttpWorkers {
    async fn slice(&self, request: &SliceRequest) -> Result<SliceResponse, WorkerError> {
        self.post(&self.config.endpoints.slice, request).await
    }
}

#[async_trait]
impl SplittingWorker for HttpWorkers {
    async fn split(&self, request: &SplitRequest) -> Result<SplitResponse, WorkerError> {
        self.post(&self.config.endpoints.split, request).await
    }
}

#[async_trait]
impl RenderingWorker for HttpWorkers {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, WorkerError> {
        self.post(&self.config.endpoints.render, request).await
    }
}

#[async_trait]
impl MergingWorker for HttpWorkers {
    async fn merge(&self, request: &MergeRequest) -> Result<MergeResponse, WorkerError> {
        self.post(&self.config.endpoints.merge, request).await
    }
}

#[async_trait]
impl DirectProcessor for HttpWorkers {
    async fn process(&self, request: &JobRequest) -> Result<DirectResponse, WorkerError> {
        self.post(&self.config.endpoints.direct, request).await
    }
}
