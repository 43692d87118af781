//! Job container command line
//!
//! Builds the shell pipeline a job container runs, its environment and its
//! bind mounts.

use harrow_core::domain::job::JobDescriptor;

use super::{Mount, RunSpec};
use crate::config::Config;

/// In-container path the pipeline tees its combined output into
const CONTAINER_LOG_PATH: &str = "/logs/pytest.log";

/// Builds the full run spec for a job container.
///
/// The returned command embeds the credential-bearing clone URL; callers
/// must not log it.
pub fn build_run_spec(config: &Config, descriptor: &JobDescriptor) -> RunSpec {
    let url = clone_url(&descriptor.repo, config.access_token.as_deref());

    RunSpec {
        name: descriptor.container_name(),
        image: descriptor.image.clone(),
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            task_command(descriptor, &url),
        ],
        env: task_env(config, descriptor),
        mounts: task_mounts(config, &descriptor.id),
    }
}

/// Clone URL with the access token spliced in for `https://` repositories
pub fn clone_url(repo: &str, token: Option<&str>) -> String {
    match (repo.strip_prefix("https://"), token) {
        (Some(rest), Some(token)) if !token.is_empty() => {
            format!("https://oauth2:{}@{}", token, rest)
        }
        _ => repo.to_string(),
    }
}

/// Replaces any userinfo in a URL with `***`, for logging
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}

fn task_command(descriptor: &JobDescriptor, url: &str) -> String {
    let cases = descriptor
        .test_case_index
        .iter()
        .map(|case| shell_quote(case))
        .collect::<Vec<_>>()
        .join(" ");

    let steps = [
        "echo '🐳 Git clone test repo'".to_string(),
        format!(
            "git clone --depth=1 -b {} {} /app",
            shell_quote(&descriptor.branch),
            shell_quote(url)
        ),
        "echo '🐳 Install requirements'".to_string(),
        "pip install -r /app/requirements.txt".to_string(),
        "pip install requests".to_string(),
        "pip install loguru".to_string(),
        "echo '🐳 Run pytest'".to_string(),
        format!("echo '🐳 Case indices:' {}", cases),
        format!(
            "python /plugins/find_test_cases.py {} --project-root /app/test_case --run",
            cases
        ),
    ];

    format!(
        "( {} ) 2>&1 | tee -a {} && tar -czvf /logs/log.tar.gz /app/TestLog",
        steps.join(" && "),
        CONTAINER_LOG_PATH
    )
}

fn task_env(config: &Config, descriptor: &JobDescriptor) -> Vec<(String, String)> {
    let merged = serde_json::Value::Object(descriptor.merged_config()).to_string();

    vec![
        ("PYTHONPATH".to_string(), "/plugins:/app".to_string()),
        ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        (
            "SERVER_IP".to_string(),
            config.server_ip.clone().unwrap_or_default(),
        ),
        ("TASK_ID".to_string(), descriptor.id.clone()),
        ("WALLY_CONFIG".to_string(), merged),
    ]
}

fn task_mounts(config: &Config, job_id: &str) -> Vec<Mount> {
    vec![
        Mount {
            host: config.pip_cache_dir.clone(),
            container: "/root/.cache/pip".to_string(),
            read_only: false,
        },
        Mount {
            host: config.plugin_dir.clone(),
            container: "/plugins".to_string(),
            read_only: true,
        },
        Mount {
            host: config.job_log_dir(job_id),
            container: "/logs".to_string(),
            read_only: false,
        },
    ]
}

/// Single-quotes a value for `sh`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
