//! Reconciliation loop
//!
//! Periodically garbage collects old exited job containers and corrects the
//! registry against what the container engine reports. Errors are logged and
//! the loop carries on with the next tick.

use chrono::{DateTime, Utc};
use harrow_core::domain::job::{JobStatus, container_name, job_id_from_container};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::container::{ContainerInfo, ContainerRuntime, ContainerStatus};
use crate::hooks::StopHookDispatcher;
use crate::registry::JobRegistry;

/// What a single cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Containers garbage collected
    pub collected: usize,
    /// Registry entries whose status changed
    pub updated: usize,
    /// Terminal transitions that fired the stop hooks
    pub hooks_fired: usize,
}

pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    registry: JobRegistry,
    hooks: Arc<StopHookDispatcher>,
    interval: Duration,
    retention: Duration,
}

impl Reconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: JobRegistry,
        hooks: Arc<StopHookDispatcher>,
        interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            runtime,
            registry,
            hooks,
            interval,
            retention,
        }
    }

    /// Starts the loop on the runtime; abort the handle to stop it
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run_forever())
    }

    pub async fn run_forever(self) {
        info!(
            "Reconciliation loop started (interval: {:?}, retention: {:?})",
            self.interval, self.retention
        );
        loop {
            let report = self.run_cycle().await;
            debug!(
                "Reconcile cycle: {} collected, {} updated, {} hooks fired",
                report.collected, report.updated, report.hooks_fired
            );
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn run_cycle(&self) -> ReconcileReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// One cycle, with `now` as the reference for container age
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport {
            collected: self.collect_garbage(now).await,
            ..Default::default()
        };
        self.reconcile_registry(&mut report).await;
        report
    }

    async fn collect_garbage(&self, now: DateTime<Utc>) -> usize {
        let retention = match chrono::Duration::from_std(self.retention) {
            Ok(retention) => retention,
            Err(e) => {
                error!("Invalid container retention {:?}: {}", self.retention, e);
                return 0;
            }
        };
        let threshold = now - retention;

        let containers = match self.runtime.list_all().await {
            Ok(containers) => containers,
            Err(e) => {
                error!("Failed to list containers for cleanup: {}", e);
                return 0;
            }
        };

        let mut collected = 0;
        for container in containers
            .iter()
            .filter(|c| c.status == ContainerStatus::Exited && c.created_at < threshold)
        {
            if self.collect(container).await {
                collected += 1;
            }
        }
        collected
    }

    async fn collect(&self, container: &ContainerInfo) -> bool {
        if let Err(e) = self.runtime.stop(&container.name).await {
            debug!("Stop before removal of {} failed: {}", container.name, e);
        }

        if let Err(e) = self.runtime.remove(&container.name, false).await {
            error!("Failed to remove expired container {}: {}", container.name, e);
            return false;
        }

        if let Some(job_id) = job_id_from_container(&container.name) {
            if self.registry.contains(job_id) {
                self.registry.remove(job_id);
                debug!("Dropped registry entry of collected job {}", job_id);
            }
        }
        info!(
            "Removed expired container {} (created {})",
            container.name, container.created_at
        );
        true
    }

    async fn reconcile_registry(&self, report: &mut ReconcileReport) {
        for job_id in self.registry.job_ids() {
            let Some(current) = self.registry.get(&job_id) else {
                continue;
            };
            if current.status.is_terminal() {
                continue;
            }

            let container = match self.runtime.inspect(&container_name(&job_id)).await {
                Ok(container) => container,
                Err(e) => {
                    error!("Failed to inspect container of job {}: {}", job_id, e);
                    continue;
                }
            };

            let observed = match container {
                None if current.status == JobStatus::Created
                    && current.container_id.is_none() =>
                {
                    // Still being launched
                    continue;
                }
                None => {
                    warn!("Container of job {} disappeared", job_id);
                    JobStatus::Failed
                }
                Some(info) => {
                    if current.container_id.is_none() {
                        self.registry.set_container_id(&job_id, &info.id);
                    }
                    match info.status {
                        ContainerStatus::Exited => JobStatus::from_exit_code(info.exit_code),
                        ContainerStatus::Dead => JobStatus::Failed,
                        ContainerStatus::Running => JobStatus::Running,
                        ContainerStatus::Paused => JobStatus::Paused,
                        ContainerStatus::Restarting => JobStatus::Restarting,
                        ContainerStatus::Created
                        | ContainerStatus::Removing
                        | ContainerStatus::Other(_) => continue,
                    }
                }
            };

            let Some(state) = self.registry.advance_status(&job_id, observed) else {
                continue;
            };
            report.updated += 1;
            debug!("Job {} reconciled to {}", job_id, observed);

            if observed.is_terminal() {
                self.hooks.trigger(&job_id, &state).await;
                report.hooks_fired += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::fake::FakeRuntime;
    use crate::hooks::testing::{RecordingHook, recording_dispatcher};
    use chrono::TimeZone;
    use harrow_core::domain::job::JobDescriptor;

    struct Fixture {
        reconciler: Reconciler,
        runtime: Arc<FakeRuntime>,
        registry: JobRegistry,
        hook: Arc<RecordingHook>,
    }

    fn fixture() -> Fixture {
        let runtime = Arc::new(FakeRuntime::new());
        let registry = JobRegistry::new();
        let (dispatcher, hook) = recording_dispatcher();
        let reconciler = Reconciler::new(
            runtime.clone(),
            registry.clone(),
            Arc::new(dispatcher),
            Duration::from_secs(60),
            Duration::from_secs(24 * 60 * 60),
        );
        Fixture {
            reconciler,
            runtime,
            registry,
            hook,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn container(
        name: &str,
        status: ContainerStatus,
        exit_code: i64,
        created_at: DateTime<Utc>,
    ) -> ContainerInfo {
        ContainerInfo {
            id: format!("id-{}", name),
            name: name.to_string(),
            status,
            exit_code,
            created_at,
        }
    }

    fn created_job(registry: &JobRegistry, id: &str) {
        registry.insert(JobDescriptor {
            id: id.to_string(),
            repo: "https://git.example.com/qa/suite.git".to_string(),
            branch: "main".to_string(),
            test_case_index: vec!["TC0001".to_string()],
            image: "python:3.10".to_string(),
            env_vars: None,
            server: None,
        });
    }

    fn running_job(registry: &JobRegistry, id: &str) {
        created_job(registry, id);
        registry.mark_running(id, &format!("id-task-{}", id));
    }

    #[tokio::test]
    async fn test_exited_container_succeeds_and_fires_once() {
        let f = fixture();
        running_job(&f.registry, "J1");
        f.runtime
            .insert(container("task-J1", ContainerStatus::Exited, 0, now()));

        let report = f.reconciler.run_cycle_at(now()).await;
        assert_eq!(report.updated, 1);
        assert_eq!(report.hooks_fired, 1);
        assert_eq!(f.registry.get("J1").unwrap().status, JobStatus::Succeeded);

        let report = f.reconciler.run_cycle_at(now()).await;
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(
            f.hook.calls(),
            vec![("J1".to_string(), JobStatus::Succeeded)]
        );
    }

    #[tokio::test]
    async fn test_gc_retention_boundary() {
        let f = fixture();
        let threshold = now() - chrono::Duration::hours(24);

        f.runtime
            .insert(container("task-keep", ContainerStatus::Exited, 0, threshold));
        f.runtime.insert(container(
            "task-old",
            ContainerStatus::Exited,
            0,
            threshold - chrono::Duration::seconds(1),
        ));
        f.runtime.insert(container(
            "task-busy",
            ContainerStatus::Running,
            0,
            threshold - chrono::Duration::hours(1),
        ));
        running_job(&f.registry, "old");
        f.registry.set_status("old", JobStatus::Succeeded);

        let report = f.reconciler.run_cycle_at(now()).await;

        assert_eq!(report.collected, 1);
        assert!(f.runtime.contains("task-keep"));
        assert!(f.runtime.contains("task-busy"));
        assert!(!f.runtime.contains("task-old"));
        assert!(f.registry.get("old").is_none());
    }

    #[tokio::test]
    async fn test_missing_container_fails_job() {
        let f = fixture();
        running_job(&f.registry, "J2");

        let report = f.reconciler.run_cycle_at(now()).await;
        assert_eq!(report.hooks_fired, 1);
        assert_eq!(f.registry.get("J2").unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_created_job_without_container_is_left_alone() {
        let f = fixture();
        created_job(&f.registry, "J3");

        let report = f.reconciler.run_cycle_at(now()).await;
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(f.registry.get("J3").unwrap().status, JobStatus::Created);
    }

    #[tokio::test]
    async fn test_terminal_status_is_never_overwritten() {
        let f = fixture();
        running_job(&f.registry, "J4");
        f.registry.set_status("J4", JobStatus::Succeeded);
        f.runtime
            .insert(container("task-J4", ContainerStatus::Exited, 1, now()));

        let report = f.reconciler.run_cycle_at(now()).await;
        assert_eq!(report.updated, 0);
        assert_eq!(f.registry.get("J4").unwrap().status, JobStatus::Succeeded);
        assert!(f.hook.calls().is_empty());
    }

    #[tokio::test]
    async fn test_paused_and_running_are_mirrored() {
        let f = fixture();
        running_job(&f.registry, "J5");
        f.runtime
            .insert(container("task-J5", ContainerStatus::Paused, 0, now()));

        let report = f.reconciler.run_cycle_at(now()).await;
        assert_eq!(report.updated, 1);
        assert_eq!(report.hooks_fired, 0);
        assert_eq!(f.registry.get("J5").unwrap().status, JobStatus::Paused);

        f.runtime.set_status("task-J5", ContainerStatus::Running);
        f.reconciler.run_cycle_at(now()).await;
        assert_eq!(f.registry.get("J5").unwrap().status, JobStatus::Running);
        assert!(f.hook.calls().is_empty());
    }
}
