//! Job submission and log download
//!
//! The gateway calls the agent on behalf of the backend.

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::Response,
};
use harrow_core::domain::job::{JobState, JobStatus};
use harrow_core::dto::job::RunTaskRequest;
use serde::Deserialize;
use tracing::info;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /tasks/run
///
/// Heartbeats the agent before submitting so an unreachable agent fails fast.
pub async fn run_task(
    State(state): State<AppState>,
    Json(req): Json<RunTaskRequest>,
) -> ApiResult<Json<JobState>> {
    state.agent.heartbeat().await?;

    let job = state.agent.run_task(&req).await?;
    if job.status != JobStatus::Created {
        return Err(ApiError::InternalError("Task run failed".to_string()));
    }

    info!("Job {} submitted to {}", job.id(), state.agent.base_url());
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Task name used in the attachment file name
    name: Option<String>,
}

/// GET /tasks/{job_id}/log?name=...
pub async fn download_log(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let download = state.agent.download_log(&job_id).await?;
    let name = query.name.as_deref().unwrap_or("task");

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, "text/plain")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}_{}.log", name, job_id),
        );
    if let Some(len) = download.content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(download.response.bytes_stream()))
        .map_err(|e| ApiError::InternalError(format!("Failed to build response: {}", e)))
}
