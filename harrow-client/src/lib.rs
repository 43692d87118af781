//! Harrow Agent Client
//!
//! A type-safe HTTP client for the agent API, plus the live log bridge that
//! relays the agent's WebSocket log stream through a bounded queue.
//!
//! # Example
//!
//! ```no_run
//! use harrow_client::AgentClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), harrow_client::ClientError> {
//!     let client = AgentClient::new("http://localhost:9001");
//!
//!     client.heartbeat().await?;
//!     for (id, job) in client.list_tasks().await? {
//!         println!("{}: {}", id, job.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod error;
mod tasks;

// Re-export commonly used types
pub use bridge::{DEFAULT_RELAY_CAPACITY, LogBridge, LogRelay};
pub use error::{ClientError, Result};
pub use tasks::{HEARTBEAT_TIMEOUT, LogDownload};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the agent API
#[derive(Debug, Clone)]
pub struct AgentClient {
    /// Base URL of the agent (e.g., "http://localhost:9001")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl AgentClient {
    /// Create a new agent client
    ///
    /// # Example
    /// ```
    /// use harrow_client::AgentClient;
    ///
    /// let client = AgentClient::new("http://localhost:9001");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new agent client with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the agent
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket URL of a job's live log
    pub fn ws_url(&self, job_id: &str) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{}/ws/logs/{}", base, job_id)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Turns a non-2xx response into an API error carrying the agent's
    /// `detail` message
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<serde_json::Value>(&error_text)
            .ok()
            .and_then(|body| body.get("detail")?.as_str().map(str::to_string))
            .unwrap_or(error_text);

        Err(ClientError::api_error(status.as_u16(), message))
    }
}
