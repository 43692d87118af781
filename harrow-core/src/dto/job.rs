//! Job DTOs for inter-service communication

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::job::{EnvVar, JobDescriptor, JobStatus};

/// Request to run a job on the agent (`POST /run`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTaskRequest {
    /// Accepts either a JSON number or a string
    #[serde(deserialize_with = "deserialize_job_id")]
    pub job_id: String,
    pub repo: String,
    #[serde(default)]
    pub cases_index: Vec<String>,
    #[serde(default = "default_image")]
    pub image: String,
    pub branch: String,
    #[serde(default)]
    pub env_vars: Option<Vec<EnvVar>>,
    #[serde(default)]
    pub server: Option<Map<String, Value>>,
}

pub const DEFAULT_IMAGE: &str = "python:3.10";

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn deserialize_job_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

impl From<RunTaskRequest> for JobDescriptor {
    fn from(req: RunTaskRequest) -> Self {
        JobDescriptor {
            id: req.job_id,
            repo: req.repo,
            branch: req.branch,
            test_case_index: req.cases_index,
            image: req.image,
            env_vars: req.env_vars,
            server: req.server,
        }
    }
}

/// Reply to `POST /tasks/{id}/stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTaskResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Plain message reply (e.g. after deleting a task)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Reply to `GET /heartbeat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_request_numeric_job_id_and_defaults() {
        let req: RunTaskRequest = serde_json::from_value(json!({
            "job_id": 17,
            "repo": "https://git.example.com/qa/suite.git",
            "cases_index": ["TC0001"],
            "branch": "main"
        }))
        .unwrap();

        assert_eq!(req.job_id, "17");
        assert_eq!(req.image, DEFAULT_IMAGE);
        assert!(req.env_vars.is_none());
        assert!(req.server.is_none());
    }

    #[test]
    fn test_run_request_into_descriptor() {
        let req: RunTaskRequest = serde_json::from_value(json!({
            "job_id": "J1",
            "repo": "git@git.example.com:qa/suite.git",
            "cases_index": ["TC0001", "TC0002"],
            "image": "python:3.12",
            "branch": "dev",
            "env_vars": [{"name": "BOARD", "value": "a1"}],
            "server": {"HOST": "10.0.0.9"}
        }))
        .unwrap();

        let descriptor = JobDescriptor::from(req);
        assert_eq!(descriptor.id, "J1");
        assert_eq!(descriptor.test_case_index, vec!["TC0001", "TC0002"]);
        assert_eq!(descriptor.image, "python:3.12");
        assert_eq!(descriptor.env_vars.as_ref().map(Vec::len), Some(1));
        assert_eq!(descriptor.server.unwrap()["HOST"], json!("10.0.0.9"));
    }
}
