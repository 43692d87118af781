//! Heartbeat endpoint, polled by callers before submitting work

use axum::{Json, extract::State};
use harrow_core::dto::job::HeartbeatResponse;

use crate::api::AppState;

/// GET /heartbeat
pub async fn heartbeat(State(state): State<AppState>) -> Json<HeartbeatResponse> {
    tracing::debug!(
        "Heartbeat ({} task(s) tracked)",
        state.lifecycle.registry().len()
    );
    Json(HeartbeatResponse {
        status: "alive".to_string(),
    })
}
