//! Container stop callback
//!
//! Posts a [`ContainerStopNotification`] to the management backend so it can
//! record the final state of the job.

use async_trait::async_trait;
use chrono::Utc;
use harrow_core::domain::job::JobState;
use harrow_core::dto::hook::ContainerStopNotification;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

use super::StopHook;

/// Default stop hook, calling back into the management backend
#[derive(Debug, Clone)]
pub struct CallbackHook {
    server: Option<String>,
    client: Client,
}

impl CallbackHook {
    /// A hook posting to `server`; `None` makes the hook a no-op.
    ///
    /// Each request is abandoned after `timeout`, so an unresponsive backend
    /// cannot hold up the dispatcher's callers.
    pub fn new(server: Option<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(server, client))
    }

    pub fn with_client(server: Option<String>, client: Client) -> Self {
        Self {
            server: server.map(|s| s.trim_end_matches('/').to_string()),
            client,
        }
    }

    /// Callback URL for a job, if a server is configured
    pub fn url(&self, job_id: &str) -> Option<String> {
        self.server.as_ref().map(|server| {
            format!("{}/api/test_task/record/{}/container_stop", server, job_id)
        })
    }
}

#[async_trait]
impl StopHook for CallbackHook {
    fn name(&self) -> &str {
        "container-stop-callback"
    }

    async fn notify(&self, job_id: &str, state: &JobState) -> anyhow::Result<()> {
        let Some(url) = self.url(job_id) else {
            warn!("SERVER_IP not set, skipping container stop callback for job {}", job_id);
            return Ok(());
        };

        let body = ContainerStopNotification::from_state(state, Utc::now());
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("callback returned {}: {}", status, text);
        }

        info!(
            "Container stop callback sent for job {} (status {})",
            job_id, body.status
        );
        Ok(())
    }
}
