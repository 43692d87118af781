//! Container lifecycle manager
//!
//! Maps job ids to `task-<id>` containers and drives them through submit,
//! execution, stop and delete. Each submitted job runs in its own
//! supervised task: the supervisor awaits the execution task, so a launch
//! error, a nonzero exit and a panic all end in `failed`, and the stop
//! hooks fire exactly once for the transition.

use harrow_core::domain::job::{
    JobDescriptor, JobState, JobStatus, container_name, is_valid_job_id,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::container::{ContainerRuntime, RuntimeError, build_run_spec, redact_url};
use crate::hooks::StopHookDispatcher;
use crate::registry::JobRegistry;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("failed to prepare job directories: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a runtime not-found into [`LifecycleError::NotFound`] for `job_id`
fn for_job(job_id: &str, e: RuntimeError) -> LifecycleError {
    if e.is_not_found() {
        LifecycleError::NotFound(job_id.to_string())
    } else {
        LifecycleError::Runtime(e)
    }
}

#[derive(Clone)]
pub struct LifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
    registry: JobRegistry,
    hooks: Arc<StopHookDispatcher>,
    config: Arc<Config>,
}

impl LifecycleManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: JobRegistry,
        hooks: Arc<StopHookDispatcher>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            runtime,
            registry,
            hooks,
            config,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers the job as `created` and starts it in the background.
    ///
    /// Returns as soon as the job is registered; resubmitting an id replaces
    /// the previous entry.
    pub fn submit(&self, descriptor: JobDescriptor) -> Result<JobState, LifecycleError> {
        if descriptor.id.trim().is_empty() {
            return Err(LifecycleError::InvalidRequest(
                "Job id is required".to_string(),
            ));
        }
        // The id becomes part of a container name and a host log directory
        if !is_valid_job_id(&descriptor.id) {
            return Err(LifecycleError::InvalidRequest(format!(
                "Invalid job id '{}': use letters, digits, '_', '.' or '-'",
                descriptor.id
            )));
        }
        if descriptor.test_case_index.is_empty() {
            return Err(LifecycleError::InvalidRequest(
                "Test case index is required".to_string(),
            ));
        }

        let state = self.registry.insert(descriptor);
        info!(
            "Job {} submitted ({} cases, image {})",
            state.id(),
            state.descriptor.test_case_index.len(),
            state.descriptor.image
        );

        let manager = self.clone();
        let job_id = state.id().to_string();
        tokio::spawn(async move { manager.supervise(job_id).await });

        Ok(state)
    }

    /// Runs the execution task and records its outcome
    async fn supervise(&self, job_id: String) {
        let execution = {
            let manager = self.clone();
            let job_id = job_id.clone();
            tokio::spawn(async move { manager.execute(&job_id).await })
        };

        let status = match execution.await {
            Ok(Ok(exit_code)) => {
                info!("Job {} container exited with code {}", job_id, exit_code);
                JobStatus::from_exit_code(exit_code)
            }
            Ok(Err(e)) => {
                error!("Job {} failed: {}", job_id, e);
                JobStatus::Failed
            }
            Err(e) => {
                error!("Job {} execution task aborted: {}", job_id, e);
                JobStatus::Failed
            }
        };

        self.finish(&job_id, status).await;
    }

    /// Launches the container and waits for it to exit
    async fn execute(&self, job_id: &str) -> Result<i64, LifecycleError> {
        let state = self
            .registry
            .get(job_id)
            .ok_or_else(|| LifecycleError::NotFound(job_id.to_string()))?;
        let descriptor = &state.descriptor;

        tokio::fs::create_dir_all(self.config.job_log_dir(job_id)).await?;
        tokio::fs::create_dir_all(&self.config.pip_cache_dir).await?;

        let spec = build_run_spec(&self.config, descriptor);
        info!(
            "Launching job {}: {} @ {}",
            job_id,
            redact_url(&descriptor.repo),
            descriptor.branch
        );

        let container_id = self.runtime.run_detached(&spec).await?;
        if self.registry.mark_running(job_id, &container_id).is_none() {
            debug!("Job {} left the registry before it started", job_id);
        }

        Ok(self.runtime.wait(&spec.name).await?)
    }

    /// Writes the final status unless the job already ended, firing hooks
    /// only when the status was written
    async fn finish(&self, job_id: &str, status: JobStatus) {
        match self.registry.advance_status(job_id, status) {
            Some(state) => {
                info!("Job {} finished: {}", job_id, status);
                self.hooks.trigger(job_id, &state).await;
            }
            None => debug!(
                "Job {} already ended or was removed, not recording {}",
                job_id, status
            ),
        }
    }

    /// Stops the job's container, fires the stop hooks and forgets the job.
    ///
    /// Both the registry entry and the container must exist, so stopping a
    /// job twice reports NotFound the second time.
    pub async fn stop(&self, job_id: &str) -> Result<(), LifecycleError> {
        let name = container_name(job_id);
        if !self.registry.contains(job_id)
            || self
                .runtime
                .inspect(&name)
                .await
                .map_err(|e| for_job(job_id, e))?
                .is_none()
        {
            return Err(LifecycleError::NotFound(job_id.to_string()));
        }

        // Marked first so the execution task sees a terminal status on exit
        let previous = self.registry.get(job_id).map(|state| state.status);
        let stopped = self.registry.set_status(job_id, JobStatus::Stopped);

        if let Err(e) = self.runtime.stop(&name).await {
            // The container keeps running, so its exit must still be recorded
            if let Some(previous) = previous {
                self.registry.set_status(job_id, previous);
            }
            warn!("Stopping job {} failed: {}", job_id, e);
            return Err(for_job(job_id, e));
        }
        info!("Job {} stopped", job_id);

        match stopped {
            Some(state) => {
                self.hooks.trigger(job_id, &state).await;
            }
            None => warn!("Job {} left the registry while stopping {}", job_id, name),
        }
        self.registry.remove(job_id);

        Ok(())
    }

    /// Force-removes the job's container, even while running, and forgets
    /// the job
    pub async fn delete(&self, job_id: &str) -> Result<(), LifecycleError> {
        self.runtime
            .remove(&container_name(job_id), true)
            .await
            .map_err(|e| for_job(job_id, e))?;
        self.registry.remove(job_id);
        info!("Job {} deleted", job_id);
        Ok(())
    }

    /// Buffered output of the job's container
    pub async fn logs(&self, job_id: &str) -> Result<String, LifecycleError> {
        self.runtime
            .logs(&container_name(job_id))
            .await
            .map_err(|e| for_job(job_id, e))
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.registry.get(job_id)
    }

    pub fn list(&self) -> std::collections::BTreeMap<String, JobState> {
        self.registry.list()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::container::fake::FakeRuntime;
    use crate::hooks::testing::{RecordingHook, recording_dispatcher};
    use std::future::Future;
    use std::time::Duration;

    pub struct Harness {
        pub manager: LifecycleManager,
        pub runtime: Arc<FakeRuntime>,
        pub hook: Arc<RecordingHook>,
        pub dir: tempfile::TempDir,
    }

    pub fn harness() -> Harness {
        harness_with(|_| {})
    }

    /// Harness whose agent config is adjusted by `configure`
    pub fn harness_with(configure: impl FnOnce(&mut Config)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let (dispatcher, hook) = recording_dispatcher();
        let mut config = Config::new(dir.path().to_path_buf());
        configure(&mut config);
        let manager = LifecycleManager::new(
            runtime.clone(),
            JobRegistry::new(),
            Arc::new(dispatcher),
            Arc::new(config),
        );
        Harness {
            manager,
            runtime,
            hook,
            dir,
        }
    }

    pub fn descriptor(id: &str) -> JobDescriptor {
        JobDescriptor {
            id: id.to_string(),
            repo: "https://git.example.com/qa/suite.git".to_string(),
            branch: "main".to_string(),
            test_case_index: vec!["TC0001".to_string(), "TC0002".to_string()],
            image: "python:3.10".to_string(),
            env_vars: None,
            server: None,
        }
    }

    /// Polls `check` until it holds, failing the test after two seconds
    pub async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    pub async fn wait_for_status(manager: &LifecycleManager, job_id: &str, status: JobStatus) {
        eventually(move || async move {
            manager.get(job_id).map(|s| s.status) == Some(status)
        })
        .await;
    }
}
