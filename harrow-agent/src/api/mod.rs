//! API Module
//!
//! HTTP and WebSocket API of the agent.

pub mod error;
pub mod health;
pub mod logs;
pub mod tasks;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::lifecycle::LifecycleManager;
use crate::tail::TailOptions;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: LifecycleManager,
    pub tail: TailOptions,
}

impl AppState {
    pub fn new(lifecycle: LifecycleManager) -> Self {
        let tail = TailOptions::from(lifecycle.config());
        Self { lifecycle, tail }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/heartbeat", get(health::heartbeat))
        // Task endpoints
        .route("/run", post(tasks::run_task))
        .route("/tasks", get(tasks::list_tasks))
        .route(
            "/tasks/{job_id}",
            get(tasks::get_task).delete(tasks::delete_task),
        )
        .route("/tasks/{job_id}/stop", post(tasks::stop_task))
        // Log endpoints
        .route("/tasks/{job_id}/log", get(logs::download_log))
        .route("/tasks/{job_id}/logs", get(logs::container_logs))
        .route("/ws/logs/{job_id}", get(logs::ws_logs))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
