use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::job::JobType;

/// Client for the inference engine running on the GPU host.
///
/// The engine is a black box: one submit endpoint per job type returning an
/// engine-side job id, and one status endpoint polled until the engine
/// reports a terminal state. Engine state is never read for client-visible
/// status; the registry is the source of truth.
pub struct EngineClient {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: Option<String>,
}

/// Snapshot of an engine-side job.
#[derive(Debug, Deserialize)]
pub struct EngineJobStatus {
    #[serde(default)]
    pub status: String,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

impl EngineClient {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(EngineError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Submit a request body to the engine route for the given job type.
    /// Returns the engine-assigned job id.
    pub async fn submit(
        &self,
        job_type: JobType,
        request_body: &serde_json::Value,
    ) -> Result<String, EngineError> {
        let url = format!("{}{}", self.base_url, job_type.engine_path());
        let response = self
            .http
            .post(&url)
            .json(request_body)
            .send()
            .await
            .map_err(EngineError::Http)?
            .error_for_status()
            .map_err(EngineError::Http)?;
        let submitted: SubmitResponse = response.json().await.map_err(EngineError::Http)?;
        submitted
            .job_id
            .ok_or_else(|| EngineError::MalformedResponse("submit response without job_id".into()))
    }

    /// Fetch the engine's view of a submitted job.
    pub async fn status(&self, engine_job_id: &str) -> Result<EngineJobStatus, EngineError> {
        let url = format!("{}/api/v1/jobs/{}", self.base_url, engine_job_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(EngineError::Http)?
            .error_for_status()
            .map_err(EngineError::Http)?;
        response.json().await.map_err(EngineError::Http)
    }

    /// Check engine reachability (logged at worker startup, never fatal).
    pub async fn health_check(&self) -> Result<(), EngineError> {
        let url = format!("{}/health", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(EngineError::Http)?
            .error_for_status()
            .map_err(EngineError::Http)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed engine response: {0}")]
    MalformedResponse(String),
}
