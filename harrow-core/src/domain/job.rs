//! Job domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything needed to run one job, fixed at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Caller-supplied job identifier
    pub id: String,
    /// Repository to clone inside the container
    pub repo: String,
    pub branch: String,
    /// Ordered test case identifiers handed to case discovery
    pub test_case_index: Vec<String>,
    /// Container image to run
    pub image: String,
    pub env_vars: Option<Vec<EnvVar>>,
    /// Free-form server/environment configuration
    pub server: Option<Map<String, Value>>,
}

impl JobDescriptor {
    /// Deterministic container name for this job
    pub fn container_name(&self) -> String {
        container_name(&self.id)
    }

    /// Configuration handed to the test run: job env vars extended and
    /// overridden by the server configuration.
    pub fn merged_config(&self) -> Map<String, Value> {
        let mut config = Map::new();

        if let Some(env_vars) = &self.env_vars {
            for var in env_vars {
                config.insert(var.name.clone(), Value::String(var.value.clone()));
            }
        }

        if let Some(server) = &self.server {
            for (key, value) in server {
                config.insert(key.clone(), value.clone());
            }
        }

        config
    }
}

/// Container name for a job id (`task-<id>`)
pub fn container_name(job_id: &str) -> String {
    format!("{}{}", CONTAINER_PREFIX, job_id)
}

/// Job id for a container name, if the container belongs to a job
pub fn job_id_from_container(name: &str) -> Option<&str> {
    name.trim_start_matches('/').strip_prefix(CONTAINER_PREFIX)
}

const CONTAINER_PREFIX: &str = "task-";

/// Whether `job_id` is usable in a container name and a host directory name:
/// an ASCII letter or digit followed by letters, digits, `_`, `.` or `-`
pub fn is_valid_job_id(job_id: &str) -> bool {
    let mut chars = job_id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        _ => false,
    }
}

/// A single environment variable supplied with the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Live state of a job as tracked by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(flatten)]
    pub descriptor: JobDescriptor,
    pub status: JobStatus,
    /// Container runtime id, set once the container is launched
    pub container_id: Option<String>,
}

impl JobState {
    /// Fresh state for a newly submitted job
    pub fn created(descriptor: JobDescriptor) -> Self {
        Self {
            descriptor,
            status: JobStatus::Created,
            container_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Succeeded,
    Failed,
    Stopped,
    Paused,
    Restarting,
}

impl JobStatus {
    /// Succeeded, failed and stopped are final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Stopped
        )
    }

    /// Status derived from a container exit code
    pub fn from_exit_code(code: i64) -> Self {
        if code == 0 {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
            JobStatus::Paused => "paused",
            JobStatus::Restarting => "restarting",
        }
    }

    /// Capitalized form used by the container stop webhook (`Succeeded`)
    pub fn capitalized(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
