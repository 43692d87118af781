//! API Module
//!
//! HTTP API of the gateway. Handlers call the agent through `AgentClient`
//! and relay its live log through a `LogBridge`.

pub mod error;
pub mod health;
pub mod hooks;
pub mod stream;
pub mod tasks;

use axum::{
    Router,
    routing::{get, post},
};
use harrow_client::{AgentClient, LogBridge};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::notifications::NotificationStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub agent: AgentClient,
    pub bridge: LogBridge,
    pub notifications: NotificationStore,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let agent = AgentClient::new(config.agent_url.clone());
        Self {
            bridge: LogBridge::with_capacity(agent.clone(), config.relay_capacity),
            agent,
            notifications: NotificationStore::new(),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/tasks/run", post(tasks::run_task))
        .route("/tasks/{job_id}/log", get(tasks::download_log))
        .route("/tasks/{job_id}/log/stream", get(stream::stream_log))
        // Container stop notifications
        .route(
            "/api/test_task/record/{job_id}/container_stop",
            post(hooks::record_container_stop),
        )
        .route("/tasks/{job_id}/container_stop", get(hooks::get_container_stop))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Router state pointing at an agent on `agent_url`
    pub fn state(agent_url: String) -> AppState {
        AppState::new(&Config {
            agent_url,
            ..Config::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let app = create_router(testing::state("http://127.0.0.1:1".to_string()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }
}
