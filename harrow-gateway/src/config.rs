//! Gateway configuration

use harrow_client::DEFAULT_RELAY_CAPACITY;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the gateway listens on
    pub bind_addr: String,

    /// Base URL of the agent (e.g., "http://10.0.0.5:9001")
    pub agent_url: String,

    /// Lines buffered per live log subscriber
    pub relay_capacity: usize,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - AGENT_URL (required)
    /// - GATEWAY_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - RELAY_CAPACITY (optional, default: 1024)
    pub fn from_env() -> anyhow::Result<Self> {
        let agent_url = std::env::var("AGENT_URL")
            .map_err(|_| anyhow::anyhow!("AGENT_URL environment variable not set"))?;

        let bind_addr =
            std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let relay_capacity = std::env::var("RELAY_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RELAY_CAPACITY);

        Ok(Self {
            bind_addr,
            agent_url,
            relay_capacity,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.agent_url.starts_with("http://") && !self.agent_url.starts_with("https://") {
            anyhow::bail!("agent_url must start with http:// or https://");
        }

        if self.relay_capacity == 0 {
            anyhow::bail!("relay_capacity must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            agent_url: "http://localhost:9001".to_string(),
            relay_capacity: DEFAULT_RELAY_CAPACITY,
        }
    }
}
