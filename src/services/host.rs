use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use strum::{Display, EnumString};

/// Lifecycle state of the compute host as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HostState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Deserialize)]
struct DescribeResponse {
    state: HostState,
}

/// Client for the compute-host control plane: describe, start, stop.
///
/// Start is only issued from Stopped, stop only from Running; every other
/// observed state makes the call a no-op. The controller never waits for
/// readiness: a message simply sits in the queue until the host is up.
pub struct HostController {
    http: Client,
    base_url: String,
    host_id: String,
}

impl HostController {
    pub fn new(base_url: &str, host_id: &str) -> Result<Self, HostError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(HostError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            host_id: host_id.to_string(),
        })
    }

    /// Current host state.
    pub async fn describe(&self) -> Result<HostState, HostError> {
        let url = format!("{}/v1/hosts/{}", self.base_url, self.host_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(HostError::Http)?
            .error_for_status()
            .map_err(HostError::Http)?;
        let described: DescribeResponse = response.json().await.map_err(HostError::Http)?;
        Ok(described.state)
    }

    /// Start the host if it is stopped. Returns the state observed before
    /// any command was issued.
    pub async fn start(&self) -> Result<HostState, HostError> {
        let state = self.describe().await?;
        if state == HostState::Stopped {
            self.command("start").await?;
            tracing::info!(host_id = %self.host_id, "host start issued");
        } else {
            tracing::debug!(host_id = %self.host_id, state = %state, "host not stopped, start skipped");
        }
        Ok(state)
    }

    /// Stop the host if it is running. A starting host is never stopped.
    /// Returns the state observed before any command was issued.
    pub async fn stop(&self) -> Result<HostState, HostError> {
        let state = self.describe().await?;
        if state == HostState::Running {
            self.command("stop").await?;
            tracing::info!(host_id = %self.host_id, "host stop issued");
        } else {
            tracing::debug!(host_id = %self.host_id, state = %state, "host not running, stop skipped");
        }
        Ok(state)
    }

    async fn command(&self, action: &str) -> Result<(), HostError> {
        let url = format!("{}/v1/hosts/{}/{}", self.base_url, self.host_id, action);
        self.http
            .post(&url)
            .send()
            .await
            .map_err(HostError::Http)?
            .error_for_status()
            .map_err(HostError::Http)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host control request failed: {0}")]
    Http(#[from] reqwest::Error),
}
