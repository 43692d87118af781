//! Docker CLI container runtime
//!
//! Drives the `docker` binary (or a compatible CLI such as podman) for the
//! job container lifecycle:
//! - Launching detached job containers with mounts and environment
//! - Waiting for exit codes
//! - Stopping, force-removing and inspecting containers
//!
//! The CLI is a blocking subprocess, so every call runs on the blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::process::{Command, Output};
use tracing::{debug, info};

use super::{ContainerInfo, ContainerRuntime, ContainerStatus, RunSpec, RuntimeError, RuntimeResult};

/// Checks that the container engine CLI is installed and answering
pub fn check_docker_available(bin: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let output = Command::new(bin)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to execute '{} --version'. Is it installed?", bin))?;

    if !output.status.success() {
        anyhow::bail!("{} is not working correctly", bin);
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Container engine is available: {}", version.trim());

    Ok(())
}

/// Container runtime backed by the Docker CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Runs the CLI on the blocking pool and returns the raw output
    async fn output(&self, args: Vec<String>) -> RuntimeResult<Output> {
        let bin = self.bin.clone();
        tokio::task::spawn_blocking(move || Command::new(&bin).args(&args).output())
            .await
            .map_err(|e| RuntimeError::Join(e.to_string()))?
            .map_err(RuntimeError::Io)
    }

    /// Runs the CLI and returns stdout, mapping failures to errors.
    ///
    /// `subject` names the container the call is about, for not-found errors
    /// and logs. Arguments are never logged since they may carry credentials.
    async fn run(&self, action: &str, subject: &str, args: Vec<String>) -> RuntimeResult<String> {
        let output = self.output(args).await?;
        check_output(action, subject, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn inspect_many(&self, targets: Vec<String>) -> RuntimeResult<Vec<ContainerInfo>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec![
            "inspect".to_string(),
            "--type".to_string(),
            "container".to_string(),
        ];
        args.extend(targets.iter().cloned());

        let output = self.output(args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        // Inspect exits nonzero when any target vanished but still prints
        // the ones it found.
        match parse_inspect(&stdout) {
            Ok(infos) if output.status.success() || !infos.is_empty() => Ok(infos),
            Ok(_) => {
                check_output("inspect", &targets.join(" "), &output)?;
                Ok(Vec::new())
            }
            Err(e) => {
                check_output("inspect", &targets.join(" "), &output)?;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run_detached(&self, spec: &RunSpec) -> RuntimeResult<String> {
        info!(
            "Creating container {} with image {}",
            spec.name, spec.image
        );

        let stdout = self.run("run", &spec.name, run_args(spec)).await?;
        let container_id = stdout.trim().to_string();

        if container_id.is_empty() {
            return Err(RuntimeError::Parse(format!(
                "no container id printed for {}",
                spec.name
            )));
        }

        info!(
            "Container {} started with ID: {}",
            spec.name, container_id
        );
        Ok(container_id)
    }

    async fn wait(&self, name: &str) -> RuntimeResult<i64> {
        let stdout = self
            .run("wait", name, vec!["wait".to_string(), name.to_string()])
            .await?;

        stdout
            .trim()
            .lines()
            .last()
            .unwrap_or_default()
            .trim()
            .parse::<i64>()
            .map_err(|e| RuntimeError::Parse(format!("exit code for {}: {}", name, e)))
    }

    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        debug!("Stopping container {}", name);
        self.run("stop", name, vec!["stop".to_string(), name.to_string()])
            .await?;
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<()> {
        debug!("Removing container {} (force: {})", name, force);
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".to_string());
        }
        args.push(name.to_string());

        self.run("rm", name, args).await?;
        Ok(())
    }

    async fn logs(&self, name: &str) -> RuntimeResult<String> {
        let output = self
            .output(vec!["logs".to_string(), name.to_string()])
            .await?;
        check_output("logs", name, &output)?;

        let mut logs = String::from_utf8_lossy(&output.stdout).to_string();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<Option<ContainerInfo>> {
        match self.inspect_many(vec![name.to_string()]).await {
            Ok(mut infos) => Ok(infos.pop()),
            Err(RuntimeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_all(&self) -> RuntimeResult<Vec<ContainerInfo>> {
        let stdout = self
            .run(
                "ps",
                "all containers",
                vec![
                    "ps".to_string(),
                    "-a".to_string(),
                    "-q".to_string(),
                    "--no-trunc".to_string(),
                ],
            )
            .await?;

        let ids: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        self.inspect_many(ids).await
    }
}

/// Arguments for `docker run -d ...`
fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];

    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(format!(
            "{}:{}:{}",
            mount.host.display(),
            mount.container,
            if mount.read_only { "ro" } else { "rw" }
        ));
    }

    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

fn check_output(action: &str, subject: &str, output: &Output) -> RuntimeResult<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let code = output.status.code().unwrap_or(-1);

    if is_not_found(&stderr) {
        debug!("{} {}: container not found", action, subject);
        return Err(RuntimeError::NotFound(subject.to_string()));
    }

    debug!(
        "{} {} failed: exit_code={} stderr='{}'",
        action, subject, code, stderr
    );
    Err(RuntimeError::CommandFailed {
        command: action.to_string(),
        code,
        stderr,
    })
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    name: String,
    created: String,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    exit_code: i64,
}

fn parse_inspect(stdout: &str) -> RuntimeResult<Vec<ContainerInfo>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let records: Vec<InspectRecord> = serde_json::from_str(trimmed)
        .map_err(|e| RuntimeError::Parse(format!("inspect output: {}", e)))?;

    records
        .into_iter()
        .map(|record| {
            let created_at = DateTime::parse_from_rfc3339(&record.created)
                .map_err(|e| {
                    RuntimeError::Parse(format!("created timestamp '{}': {}", record.created, e))
                })?
                .with_timezone(&Utc);

            Ok(ContainerInfo {
                id: record.id,
                name: record.name.trim_start_matches('/').to_string(),
                status: ContainerStatus::parse(&record.state.status),
                exit_code: record.state.exit_code,
                created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Mount;
    use chrono::TimeZone;
    use std::path::PathBuf;

    #[test]
    fn test_run_args_layout() {
        let spec = RunSpec {
            name: "task-7".to_string(),
            image: "python:3.10".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), "echo hi".to_string()],
            env: vec![("TASK_ID".to_string(), "7".to_string())],
            mounts: vec![
                Mount {
                    host: PathBuf::from("/srv/plugins"),
                    container: "/plugins".to_string(),
                    read_only: true,
                },
                Mount {
                    host: PathBuf::from("/srv/logs/job_7"),
                    container: "/logs".to_string(),
                    read_only: false,
                },
            ],
        };

        assert_eq!(
            run_args(&spec),
            vec![
                "run",
                "-d",
                "--name",
                "task-7",
                "-v",
                "/srv/plugins:/plugins:ro",
                "-v",
                "/srv/logs/job_7:/logs:rw",
                "-e",
                "TASK_ID=7",
                "python:3.10",
                "sh",
                "-c",
                "echo hi",
            ]
        );
    }

    #[test]
    fn test_parse_inspect() {
        let stdout = r#"[
          {
            "Id": "f00dbabe",
            "Name": "/task-42",
            "Created": "2024-05-20T12:34:56.789012345Z",
            "State": {"Status": "exited", "ExitCode": 2, "Running": false}
          }
        ]"#;

        let infos = parse_inspect(stdout).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, "f00dbabe");
        assert_eq!(infos[0].name, "task-42");
        assert_eq!(infos[0].status, ContainerStatus::Exited);
        assert_eq!(infos[0].exit_code, 2);
        assert_eq!(
            infos[0].created_at.timestamp(),
            Utc.with_ymd_and_hms(2024, 5, 20, 12, 34, 56).unwrap().timestamp()
        );
    }

    #[test]
    fn test_parse_inspect_empty_and_garbage() {
        assert!(parse_inspect("").unwrap().is_empty());
        assert!(parse_inspect("[]").unwrap().is_empty());
        assert!(matches!(
            parse_inspect("not json"),
            Err(RuntimeError::Parse(_))
        ));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Error response from daemon: No such container: task-1"));
        assert!(is_not_found("Error: no such object: task-1"));
        assert!(!is_not_found("permission denied"));
    }
}
