//! Container runtime abstraction
//!
//! The lifecycle manager and the reconciliation loop only talk to the
//! container engine through [`ContainerRuntime`]. The production
//! implementation drives the Docker CLI; tests use an in-memory fake.

mod command;
mod docker;

pub use command::{build_run_spec, redact_url};
pub use docker::{DockerCli, check_docker_available};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by a container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No container with the given name or id
    #[error("container not found: {0}")]
    NotFound(String),

    /// The engine CLI ran but reported failure
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The engine CLI could not be spawned
    #[error("failed to execute container engine: {0}")]
    Io(#[from] std::io::Error),

    /// Engine output could not be understood
    #[error("unexpected container engine output: {0}")]
    Parse(String),

    /// The blocking worker running the call died
    #[error("container engine call aborted: {0}")]
    Join(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Container state as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Other(String),
}

impl ContainerStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            other => ContainerStatus::Other(other.to_string()),
        }
    }
}

/// Snapshot of a single container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    /// Container name without the leading `/`
    pub name: String,
    pub status: ContainerStatus,
    pub exit_code: i64,
    pub created_at: DateTime<Utc>,
}

/// A bind mount from the host into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

/// Everything needed to launch a detached job container
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    /// Entrypoint command and arguments
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
}

/// Operations the agent needs from a container engine
///
/// Every call may block on the engine; implementations must not stall the
/// async executor.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Starts a detached container and returns its id
    async fn run_detached(&self, spec: &RunSpec) -> RuntimeResult<String>;

    /// Blocks until the container exits and returns its exit code
    async fn wait(&self, name: &str) -> RuntimeResult<i64>;

    /// Sends the stop signal; stopping an exited container is not an error
    async fn stop(&self, name: &str) -> RuntimeResult<()>;

    /// Removes the container, killing it first when `force` is set
    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<()>;

    /// Full buffered output of the container
    async fn logs(&self, name: &str) -> RuntimeResult<String>;

    /// Looks up a container by name, `None` if it does not exist
    async fn inspect(&self, name: &str) -> RuntimeResult<Option<ContainerInfo>>;

    /// All containers, including stopped ones
    async fn list_all(&self) -> RuntimeResult<Vec<ContainerInfo>>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory container runtime for tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::watch;

    struct FakeContainer {
        info: ContainerInfo,
        spec: Option<RunSpec>,
        exit_tx: watch::Sender<Option<i64>>,
    }

    /// Containers live in a map; tests drive exits with [`FakeRuntime::exit`]
    #[derive(Default)]
    pub struct FakeRuntime {
        containers: Mutex<HashMap<String, FakeContainer>>,
        fail_launch: Mutex<Option<String>>,
        fail_stop: Mutex<Option<String>>,
        panic_on_launch: Mutex<bool>,
        next_id: Mutex<u64>,
        pub stopped: Mutex<Vec<String>>,
    }

    impl FakeRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next launches fail with the given message
        pub fn fail_launch_with(&self, message: &str) {
            *self.fail_launch.lock().unwrap() = Some(message.to_string());
        }

        /// Makes stop calls fail with the given message, `None` restores them
        pub fn fail_stop_with(&self, message: Option<&str>) {
            *self.fail_stop.lock().unwrap() = message.map(str::to_string);
        }

        /// Makes the next launches panic
        pub fn panic_on_launch(&self) {
            *self.panic_on_launch.lock().unwrap() = true;
        }

        /// Registers an existing container, as if created outside the agent
        pub fn insert(&self, info: ContainerInfo) {
            let (exit_tx, _) = watch::channel(match info.status {
                ContainerStatus::Exited => Some(info.exit_code),
                _ => None,
            });
            self.containers.lock().unwrap().insert(
                info.name.clone(),
                FakeContainer {
                    info,
                    spec: None,
                    exit_tx,
                },
            );
        }

        /// Marks the container exited with `code`, releasing any waiter
        pub fn exit(&self, name: &str, code: i64) {
            let mut containers = self.containers.lock().unwrap();
            if let Some(container) = containers.get_mut(name) {
                container.info.status = ContainerStatus::Exited;
                container.info.exit_code = code;
                container.exit_tx.send_replace(Some(code));
            }
        }

        pub fn set_status(&self, name: &str, status: ContainerStatus) {
            if let Some(container) = self.containers.lock().unwrap().get_mut(name) {
                container.info.status = status;
            }
        }

        pub fn contains(&self, name: &str) -> bool {
            self.containers.lock().unwrap().contains_key(name)
        }

        pub fn spec(&self, name: &str) -> Option<RunSpec> {
            self.containers
                .lock()
                .unwrap()
                .get(name)
                .and_then(|c| c.spec.clone())
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn run_detached(&self, spec: &RunSpec) -> RuntimeResult<String> {
            if *self.panic_on_launch.lock().unwrap() {
                panic!("engine exploded");
            }
            if let Some(message) = self.fail_launch.lock().unwrap().clone() {
                return Err(RuntimeError::CommandFailed {
                    command: "run".to_string(),
                    code: 125,
                    stderr: message,
                });
            }

            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("cid{:04}", *next)
            };
            let (exit_tx, _) = watch::channel(None);
            self.containers.lock().unwrap().insert(
                spec.name.clone(),
                FakeContainer {
                    info: ContainerInfo {
                        id: id.clone(),
                        name: spec.name.clone(),
                        status: ContainerStatus::Running,
                        exit_code: 0,
                        created_at: Utc::now(),
                    },
                    spec: Some(spec.clone()),
                    exit_tx,
                },
            );
            Ok(id)
        }

        async fn wait(&self, name: &str) -> RuntimeResult<i64> {
            let mut rx = {
                let containers = self.containers.lock().unwrap();
                let container = containers
                    .get(name)
                    .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
                container.exit_tx.subscribe()
            };
            loop {
                if let Some(code) = *rx.borrow_and_update() {
                    return Ok(code);
                }
                if rx.changed().await.is_err() {
                    return Err(RuntimeError::NotFound(name.to_string()));
                }
            }
        }

        async fn stop(&self, name: &str) -> RuntimeResult<()> {
            if !self.contains(name) {
                return Err(RuntimeError::NotFound(name.to_string()));
            }
            if let Some(message) = self.fail_stop.lock().unwrap().clone() {
                return Err(RuntimeError::CommandFailed {
                    command: "stop".to_string(),
                    code: 1,
                    stderr: message,
                });
            }
            self.stopped.lock().unwrap().push(name.to_string());
            let already_exited = {
                let containers = self.containers.lock().unwrap();
                containers
                    .get(name)
                    .map(|c| c.info.status == ContainerStatus::Exited)
                    .unwrap_or(false)
            };
            if !already_exited {
                self.exit(name, 137);
            }
            Ok(())
        }

        async fn remove(&self, name: &str, _force: bool) -> RuntimeResult<()> {
            match self.containers.lock().unwrap().remove(name) {
                Some(_) => Ok(()),
                None => Err(RuntimeError::NotFound(name.to_string())),
            }
        }

        async fn logs(&self, name: &str) -> RuntimeResult<String> {
            if self.contains(name) {
                Ok(format!("output of {}\n", name))
            } else {
                Err(RuntimeError::NotFound(name.to_string()))
            }
        }

        async fn inspect(&self, name: &str) -> RuntimeResult<Option<ContainerInfo>> {
            Ok(self
                .containers
                .lock()
                .unwrap()
                .get(name)
                .map(|c| c.info.clone()))
        }

        async fn list_all(&self) -> RuntimeResult<Vec<ContainerInfo>> {
            let mut all: Vec<ContainerInfo> = self
                .containers
                .lock()
                .unwrap()
                .values()
                .map(|c| c.info.clone())
                .collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(all)
        }
    }
}
