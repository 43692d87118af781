//! Agent configuration
//!
//! Defines the bind address, callback server, host directories mounted into
//! job containers, and the timing knobs of the reconciliation loop and the
//! log tail streamer.

use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket API listens on
    pub bind_addr: String,

    /// Management backend base URL, used for the container stop callback and
    /// handed to containers as `SERVER_IP`. Unset disables the callback.
    pub server_ip: Option<String>,

    /// Upper bound on one container stop callback request
    pub callback_timeout: Duration,

    /// Token spliced into `https://` clone URLs
    pub access_token: Option<String>,

    /// Host directory holding one `job_<id>` log directory per job
    pub log_host_dir: PathBuf,

    /// Host directory with the case discovery/report plugin, mounted read-only
    pub plugin_dir: PathBuf,

    /// Host pip cache shared by all job containers
    pub pip_cache_dir: PathBuf,

    /// Container engine CLI binary
    pub docker_bin: String,

    /// How often the reconciliation loop runs
    pub reconcile_interval: Duration,

    /// Exited containers older than this are garbage collected
    pub container_retention: Duration,

    /// Maximum history lines sent to a new log subscriber
    pub log_backlog_lines: usize,

    /// Sleep between reads when the log file has no new data
    pub log_poll_interval: Duration,
}

impl Config {
    /// Creates a configuration rooted at `base_dir` with default timings
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            bind_addr: "0.0.0.0:9001".to_string(),
            server_ip: None,
            callback_timeout: Duration::from_secs(30),
            access_token: None,
            log_host_dir: base_dir.join("log").join("test_logs"),
            plugin_dir: base_dir.join("test_runner_plugin"),
            pip_cache_dir: base_dir.join(".cache").join("pip"),
            docker_bin: "docker".to_string(),
            reconcile_interval: Duration::from_secs(60),
            container_retention: Duration::from_secs(24 * 60 * 60),
            log_backlog_lines: 500,
            log_poll_interval: Duration::from_millis(200),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SERVER_IP (required, callback base URL of the management backend)
    /// - GITLAB_ACCESS_TOKEN (required)
    /// - AGENT_BIND_ADDR (optional, default: 0.0.0.0:9001)
    /// - AGENT_HOME (optional, base for the default directories, default: cwd)
    /// - LOG_HOST_DIR, PLUGIN_DIR, PIP_CACHE_DIR (optional overrides)
    /// - DOCKER_BIN (optional, default: docker)
    /// - CALLBACK_TIMEOUT_SECS (optional, default: 30)
    /// - RECONCILE_INTERVAL (optional, seconds, default: 60)
    /// - CONTAINER_RETENTION_HOURS (optional, default: 24)
    /// - LOG_BACKLOG_LINES (optional, default: 500)
    /// - LOG_POLL_INTERVAL_MS (optional, default: 200)
    pub fn from_env() -> anyhow::Result<Self> {
        let server_ip = std::env::var("SERVER_IP")
            .map_err(|_| anyhow::anyhow!("SERVER_IP environment variable not set"))?;

        let access_token = std::env::var("GITLAB_ACCESS_TOKEN")
            .map_err(|_| anyhow::anyhow!("GITLAB_ACCESS_TOKEN environment variable not set"))?;

        let base_dir = match std::env::var("AGENT_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()?,
        };

        let mut config = Self::new(base_dir);
        config.server_ip = Some(server_ip);
        config.access_token = Some(access_token);

        if let Ok(addr) = std::env::var("AGENT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("LOG_HOST_DIR") {
            config.log_host_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PLUGIN_DIR") {
            config.plugin_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PIP_CACHE_DIR") {
            config.pip_cache_dir = PathBuf::from(dir);
        }
        if let Ok(bin) = std::env::var("DOCKER_BIN") {
            config.docker_bin = bin;
        }

        if let Some(secs) = env_parse::<u64>("CALLBACK_TIMEOUT_SECS") {
            config.callback_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RECONCILE_INTERVAL") {
            config.reconcile_interval = Duration::from_secs(secs);
        }
        if let Some(hours) = env_parse::<u64>("CONTAINER_RETENTION_HOURS") {
            config.container_retention = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(lines) = env_parse::<usize>("LOG_BACKLOG_LINES") {
            config.log_backlog_lines = lines;
        }
        if let Some(ms) = env_parse::<u64>("LOG_POLL_INTERVAL_MS") {
            config.log_poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Host log directory of a job
    pub fn job_log_dir(&self, job_id: &str) -> PathBuf {
        self.log_host_dir.join(format!("job_{}", job_id))
    }

    /// Host path of the log file the job container tees into
    pub fn job_log_file(&self, job_id: &str) -> PathBuf {
        self.job_log_dir(job_id).join("pytest.log")
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if let Some(server) = &self.server_ip {
            if !server.starts_with("http://") && !server.starts_with("https://") {
                anyhow::bail!("SERVER_IP must start with http:// or https://");
            }
        }

        if self.docker_bin.is_empty() {
            anyhow::bail!("docker_bin cannot be empty");
        }

        if self.callback_timeout.is_zero() {
            anyhow::bail!("callback_timeout must be greater than 0");
        }

        if self.reconcile_interval.is_zero() {
            anyhow::bail!("reconcile_interval must be greater than 0");
        }

        if self.log_backlog_lines == 0 {
            anyhow::bail!("log_backlog_lines must be greater than 0");
        }

        if self.log_poll_interval.is_zero() {
            anyhow::bail!("log_poll_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}
