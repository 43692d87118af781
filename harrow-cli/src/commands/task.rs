//! Task command handlers
//!
//! Handles job submission, inspection and log access against one agent.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use futures_util::StreamExt;
use harrow_client::{AgentClient, LogBridge};
use harrow_core::domain::job::{EnvVar, JobState, JobStatus};
use harrow_core::dto::job::{DEFAULT_IMAGE, RunTaskRequest};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Arguments of `harrow run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job ID
    #[arg(long)]
    pub job_id: String,

    /// Git repository holding the test suite
    #[arg(long)]
    pub repo: String,

    /// Branch to check out
    #[arg(long)]
    pub branch: String,

    /// Container image
    #[arg(long, default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Test case index to run (repeatable)
    #[arg(long = "case", required = true)]
    pub cases: Vec<String>,

    /// Extra environment variable as NAME=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_var)]
    pub env: Vec<EnvVar>,

    /// Server configuration as a JSON object
    #[arg(long, value_parser = parse_server)]
    pub server: Option<Map<String, Value>>,
}

impl From<RunArgs> for RunTaskRequest {
    fn from(args: RunArgs) -> Self {
        RunTaskRequest {
            job_id: args.job_id,
            repo: args.repo,
            cases_index: args.cases,
            image: args.image,
            branch: args.branch,
            env_vars: (!args.env.is_empty()).then_some(args.env),
            server: args.server,
        }
    }
}

fn parse_env_var(s: &str) -> Result<EnvVar, String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok(EnvVar {
            name: name.to_string(),
            value: value.to_string(),
        }),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn parse_server(s: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str(s) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("server configuration must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}

pub async fn heartbeat(client: &AgentClient) -> Result<()> {
    let reply = client.heartbeat().await?;
    println!(
        "{} Agent at {} is {}",
        "✓".green(),
        client.base_url(),
        reply.status.green()
    );
    Ok(())
}

pub async fn run(client: &AgentClient, args: RunArgs) -> Result<()> {
    let req = RunTaskRequest::from(args);
    let job = client
        .run_task(&req)
        .await
        .with_context(|| format!("Failed to submit job {}", req.job_id))?;

    println!("{} Job {} submitted", "✓".green(), job.id().cyan());
    print_job_details(&job);
    Ok(())
}

pub async fn status(client: &AgentClient, id: &str) -> Result<()> {
    let job = client.get_task(id).await?;
    print_job_details(&job);
    Ok(())
}

pub async fn list(client: &AgentClient) -> Result<()> {
    let jobs = client.list_tasks().await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs.values() {
            print_job_summary(job);
        }
    }

    Ok(())
}

pub async fn stop(client: &AgentClient, id: &str) -> Result<()> {
    let reply = client.stop_task(id).await?;
    println!(
        "{} Job {} {}",
        "✓".green(),
        reply.job_id.cyan(),
        colorize_status(&reply.status)
    );
    Ok(())
}

pub async fn delete(client: &AgentClient, id: &str) -> Result<()> {
    let reply = client.delete_task(id).await?;
    println!("{} {}", "✓".green(), reply.message);
    Ok(())
}

pub async fn logs(client: &AgentClient, id: &str) -> Result<()> {
    let output = client.task_logs(id).await?;

    if output.is_empty() {
        println!("{}", "No output yet.".yellow());
    } else {
        print!("{}", output);
    }

    Ok(())
}

pub async fn download(client: &AgentClient, id: &str, output: Option<PathBuf>) -> Result<()> {
    let download = client.download_log(id).await?;

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let written = copy_body(download.response.bytes_stream(), &mut out).await?;

    if let Some(path) = output {
        eprintln!(
            "{} Saved {} byte(s) to {}",
            "✓".green(),
            written,
            path.display()
        );
    }
    Ok(())
}

async fn copy_body<S, B, E, W>(body: S, out: &mut W) -> Result<u64>
where
    S: futures_util::Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
    W: AsyncWrite + Unpin,
{
    let mut body = std::pin::pin!(body);
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Log download interrupted")?;
        out.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

pub async fn follow(client: &AgentClient, id: &str) -> Result<()> {
    let mut relay = LogBridge::new(client.clone()).open(id);

    tokio::select! {
        lines = relay.forward(
            |line| {
                println!("{}", line);
                async { true }
            },
            || true,
        ) => {
            eprintln!("{}", format!("Log stream closed after {} line(s)", lines).dimmed());
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "Interrupted".dimmed());
        }
    }

    Ok(())
}

/// Print a one-job summary line block
fn print_job_summary(job: &JobState) {
    println!("  {} Job {}", "▸".cyan(), job.id().bold());
    println!("    Status:    {}", colorize_status(&job.status));
    println!("    Branch:    {}", job.descriptor.branch.dimmed());
    if let Some(container) = &job.container_id {
        println!("    Container: {}", container.dimmed());
    }
    println!();
}

/// Print detailed job information
fn print_job_details(job: &JobState) {
    let descriptor = &job.descriptor;

    println!("{}", "Job Details:".bold());
    println!("  ID:         {}", job.id().cyan());
    println!("  Status:     {}", colorize_status(&job.status));
    println!("  Repository: {}", descriptor.repo);
    println!("  Branch:     {}", descriptor.branch);
    println!("  Image:      {}", descriptor.image);
    println!("  Container:  {}", job.container_id.as_deref().unwrap_or("-"));

    if !descriptor.test_case_index.is_empty() {
        println!("\n{}", "Test cases:".bold());
        for case in &descriptor.test_case_index {
            println!("  {}", case);
        }
    }

    if let Some(vars) = &descriptor.env_vars {
        println!("\n{}", "Environment:".bold());
        for var in vars {
            println!("  {} = {}", var.name.cyan(), var.value);
        }
    }
}

/// Colorize job status for display
fn colorize_status(status: &JobStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        JobStatus::Created => label.dimmed(),
        JobStatus::Running | JobStatus::Restarting => label.cyan(),
        JobStatus::Paused => label.yellow(),
        JobStatus::Succeeded => label.green(),
        JobStatus::Failed => label.red(),
        JobStatus::Stopped => label.magenta(),
    }
}
