//! Container stop webhook payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::JobState;

/// Body posted to the backend when a job's container stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStopNotification {
    /// Capitalized job status (`Succeeded`, `Failed`, `Stopped`, ...)
    pub status: String,
    pub container_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ContainerStopNotification {
    pub fn from_state(state: &JobState, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: state.status.capitalized(),
            container_id: state.container_id.clone(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{JobDescriptor, JobStatus};

    #[test]
    fn test_notification_from_state() {
        let mut state = JobState::created(JobDescriptor {
            id: "9".to_string(),
            repo: "https://git.example.com/qa/suite.git".to_string(),
            branch: "main".to_string(),
            test_case_index: vec!["TC0001".to_string()],
            image: "python:3.10".to_string(),
            env_vars: None,
            server: None,
        });
        state.status = JobStatus::Failed;
        state.container_id = Some("abc123".to_string());

        let now = Utc::now();
        let notification = ContainerStopNotification::from_state(&state, now);
        assert_eq!(notification.status, "Failed");
        assert_eq!(notification.container_id.as_deref(), Some("abc123"));
        assert_eq!(notification.timestamp, now);
    }
}
