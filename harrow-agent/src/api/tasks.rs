//! Task API Handlers
//!
//! Submission, status and control of job containers.

use axum::{
    Json,
    extract::{Path, State},
};
use harrow_core::domain::job::{JobState, JobStatus};
use harrow_core::dto::job::{MessageResponse, RunTaskRequest, StopTaskResponse};
use std::collections::BTreeMap;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /run
/// Register a job and start its container in the background
pub async fn run_task(
    State(state): State<AppState>,
    Json(req): Json<RunTaskRequest>,
) -> ApiResult<Json<JobState>> {
    tracing::info!("Run request for job {} ({})", req.job_id, req.branch);

    let job = state.lifecycle.submit(req.into())?;
    Ok(Json(job))
}

/// GET /tasks
pub async fn list_tasks(State(state): State<AppState>) -> Json<BTreeMap<String, JobState>> {
    tracing::debug!("Listing tasks");
    Json(state.lifecycle.list())
}

/// GET /tasks/{job_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobState>> {
    tracing::debug!("Getting task: {}", job_id);

    state
        .lifecycle
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

/// POST /tasks/{job_id}/stop
pub async fn stop_task(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StopTaskResponse>> {
    tracing::info!("Stopping task: {}", job_id);

    state.lifecycle.stop(&job_id).await?;
    Ok(Json(StopTaskResponse {
        job_id,
        status: JobStatus::Stopped,
    }))
}

/// DELETE /tasks/{job_id}
pub async fn delete_task(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    tracing::info!("Deleting task: {}", job_id);

    state.lifecycle.delete(&job_id).await?;
    Ok(Json(MessageResponse {
        message: "Task deleted successfully".to_string(),
    }))
}
