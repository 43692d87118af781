//! Job registry
//!
//! In-memory table of job id to job state, shared by the API handlers, the
//! lifecycle manager and the reconciliation loop. Nothing is persisted.
//!
//! Every compound check-then-write is a single method holding the lock, and
//! the lock is never held across an `.await`.

use harrow_core::domain::job::{JobDescriptor, JobState, JobStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe job table
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, JobState>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobState>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a job as `created`, replacing any previous entry
    pub fn insert(&self, descriptor: JobDescriptor) -> JobState {
        let state = JobState::created(descriptor);
        self.lock().insert(state.id().to_string(), state.clone());
        state
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.lock().get(job_id).cloned()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains_key(job_id)
    }

    /// Snapshot of every entry, ordered by job id
    pub fn list(&self) -> BTreeMap<String, JobState> {
        self.lock()
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn remove(&self, job_id: &str) -> Option<JobState> {
        self.lock().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn set_container_id(&self, job_id: &str, container_id: &str) -> Option<JobState> {
        let mut jobs = self.lock();
        let state = jobs.get_mut(job_id)?;
        state.container_id = Some(container_id.to_string());
        Some(state.clone())
    }

    /// Records the container id and moves a `created` job to `running`
    pub fn mark_running(&self, job_id: &str, container_id: &str) -> Option<JobState> {
        let mut jobs = self.lock();
        let state = jobs.get_mut(job_id)?;
        state.container_id = Some(container_id.to_string());
        if state.status == JobStatus::Created {
            state.status = JobStatus::Running;
        }
        Some(state.clone())
    }

    /// Unconditionally sets the status
    pub fn set_status(&self, job_id: &str, status: JobStatus) -> Option<JobState> {
        let mut jobs = self.lock();
        let state = jobs.get_mut(job_id)?;
        state.status = status;
        Some(state.clone())
    }

    /// Sets the status unless the job already reached a terminal status.
    ///
    /// Returns the updated state only when something was written, so callers
    /// can fire stop hooks exactly once per terminal transition.
    pub fn advance_status(&self, job_id: &str, status: JobStatus) -> Option<JobState> {
        let mut jobs = self.lock();
        let state = jobs.get_mut(job_id)?;
        if state.status.is_terminal() || state.status == status {
            return None;
        }
        state.status = status;
        Some(state.clone())
    }

    /// Empties the registry, returning what it held
    pub fn drain(&self) -> Vec<JobState> {
        self.lock().drain().map(|(_, state)| state).collect()
    }
}
