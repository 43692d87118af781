//! Task-related API endpoints

use harrow_core::domain::job::JobState;
use harrow_core::dto::job::{HeartbeatResponse, MessageResponse, RunTaskRequest, StopTaskResponse};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::AgentClient;
use crate::error::{ClientError, Result};

/// How long the agent has to answer a heartbeat
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(1);

/// A log file download still being received from the agent
#[derive(Debug)]
pub struct LogDownload {
    /// Size announced by the agent, if any
    pub content_length: Option<u64>,
    /// The streaming response; read it with `bytes_stream()` or `bytes()`
    pub response: reqwest::Response,
}

impl AgentClient {
    /// Check that the agent is up
    ///
    /// Any failure, including not answering within [`HEARTBEAT_TIMEOUT`],
    /// is reported as [`ClientError::AgentUnavailable`].
    pub async fn heartbeat(&self) -> Result<HeartbeatResponse> {
        let url = format!("{}/heartbeat", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEARTBEAT_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::AgentUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::AgentUnavailable(format!(
                "heartbeat failed, status: {}",
                status
            )));
        }

        tracing::debug!("Heartbeat to {} succeeded", self.base_url);
        response
            .json()
            .await
            .map_err(|e| ClientError::AgentUnavailable(format!("invalid heartbeat reply: {}", e)))
    }

    /// Submit a job
    ///
    /// # Returns
    /// The registered job state, normally with status `created`
    pub async fn run_task(&self, req: &RunTaskRequest) -> Result<JobState> {
        let url = format!("{}/run", self.base_url);
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Get a job's state
    pub async fn get_task(&self, job_id: &str) -> Result<JobState> {
        let url = format!("{}/tasks/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Every job the agent tracks, keyed by job id
    pub async fn list_tasks(&self) -> Result<BTreeMap<String, JobState>> {
        let url = format!("{}/tasks", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Stop a job's container
    pub async fn stop_task(&self, job_id: &str) -> Result<StopTaskResponse> {
        let url = format!("{}/tasks/{}/stop", self.base_url, job_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Force-remove a job's container
    pub async fn delete_task(&self, job_id: &str) -> Result<MessageResponse> {
        let url = format!("{}/tasks/{}", self.base_url, job_id);
        let response = self.client.delete(&url).send().await?;

        self.handle_response(response).await
    }

    /// Buffered output of a job's container
    pub async fn task_logs(&self, job_id: &str) -> Result<String> {
        let url = format!("{}/tasks/{}/logs", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Start downloading a job's full log file
    pub async fn download_log(&self, job_id: &str) -> Result<LogDownload> {
        let url = format!("{}/tasks/{}/log", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;
        let response = self.check_status(response).await?;

        Ok(LogDownload {
            content_length: response.content_length(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harrow_core::domain::job::JobStatus;
    use httpmock::prelude::*;
    use serde_json::json;

    fn job_json(status: &str) -> serde_json::Value {
        json!({
            "id": "J1",
            "repo": "https://git.example.com/qa/suite.git",
            "branch": "main",
            "test_case_index": ["TC0001", "TC0002"],
            "image": "python:3.10",
            "env_vars": null,
            "server": null,
            "status": status,
            "container_id": null
        })
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/heartbeat");
            then.status(200).json_body(json!({"status": "alive"}));
        });

        let client = AgentClient::new(server.base_url());
        assert_eq!(client.heartbeat().await.unwrap().status, "alive");
        mock.assert();
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_is_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/heartbeat");
            then.status(200)
                .delay(Duration::from_millis(1500))
                .json_body(json!({"status": "alive"}));
        });

        let client = AgentClient::new(server.base_url());
        let err = client.heartbeat().await.unwrap_err();
        assert!(matches!(err, ClientError::AgentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_error_status_is_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/heartbeat");
            then.status(503);
        });

        let client = AgentClient::new(server.base_url());
        assert!(matches!(
            client.heartbeat().await,
            Err(ClientError::AgentUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_run_task() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/run").json_body_includes(
                json!({
                    "job_id": "J1",
                    "cases_index": ["TC0001", "TC0002"],
                    "image": "python:3.10"
                })
                .to_string(),
            );
            then.status(200).json_body(job_json("created"));
        });

        let req: RunTaskRequest = serde_json::from_value(json!({
            "job_id": "J1",
            "repo": "https://git.example.com/qa/suite.git",
            "branch": "main",
            "cases_index": ["TC0001", "TC0002"]
        }))
        .unwrap();

        let client = AgentClient::new(server.base_url());
        let job = client.run_task(&req).await.unwrap();
        assert_eq!(job.id(), "J1");
        assert_eq!(job.status, JobStatus::Created);
        mock.assert();
    }

    #[tokio::test]
    async fn test_not_found_carries_detail() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tasks/J9/stop");
            then.status(404).json_body(json!({"detail": "Task not found"}));
        });

        let client = AgentClient::new(server.base_url());
        let err = client.stop_task("J9").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, ClientError::ApiError { message, .. } if message == "Task not found"));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/tasks");
            then.status(200).json_body(json!({"J1": job_json("running")}));
        });
        server.mock(|when, then| {
            when.method(DELETE).path("/tasks/J1");
            then.status(200)
                .json_body(json!({"message": "Task deleted successfully"}));
        });

        let client = AgentClient::new(server.base_url());
        let tasks = client.list_tasks().await.unwrap();
        assert_eq!(tasks["J1"].status, JobStatus::Running);

        let reply = client.delete_task("J1").await.unwrap();
        assert_eq!(reply.message, "Task deleted successfully");
    }

    #[tokio::test]
    async fn test_download_log() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/tasks/J1/log");
            then.status(200)
                .header("content-type", "text/plain")
                .body("2 passed\n");
        });

        let client = AgentClient::new(server.base_url());
        let download = client.download_log("J1").await.unwrap();
        assert_eq!(download.content_length, Some(9));
        assert_eq!(&download.response.bytes().await.unwrap()[..], b"2 passed\n");
    }
}
