//! Container stop webhook receiver

use axum::{
    Json,
    extract::{Path, State},
};
use harrow_core::dto::hook::ContainerStopNotification;
use harrow_core::dto::job::MessageResponse;
use tracing::info;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/test_task/record/{job_id}/container_stop
pub async fn record_container_stop(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(notification): Json<ContainerStopNotification>,
) -> Json<MessageResponse> {
    info!(
        "Container of job {} stopped: status={}, container={}, at {}",
        job_id,
        notification.status,
        notification.container_id.as_deref().unwrap_or("-"),
        notification.timestamp
    );
    state.notifications.record(&job_id, notification);

    Json(MessageResponse {
        message: "Notification recorded".to_string(),
    })
}

/// GET /tasks/{job_id}/container_stop
pub async fn get_container_stop(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ContainerStopNotification>> {
    state
        .notifications
        .latest(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No container stop recorded".to_string()))
}
