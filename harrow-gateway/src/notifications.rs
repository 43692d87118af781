//! Container stop notifications received from the agent, latest per job

use harrow_core::dto::hook::ContainerStopNotification;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct NotificationStore {
    latest: Arc<RwLock<HashMap<String, ContainerStopNotification>>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `notification` as the latest one for the job
    pub fn record(&self, job_id: &str, notification: ContainerStopNotification) {
        self.latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job_id.to_string(), notification);
    }

    pub fn latest(&self, job_id: &str) -> Option<ContainerStopNotification> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(job_id)
            .cloned()
    }
}
