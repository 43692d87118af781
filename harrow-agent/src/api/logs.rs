//! Log API Handlers
//!
//! Full log download, container output snapshot and the live WebSocket
//! tail of a job's log file.

use axum::{
    Json,
    body::Body,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::header,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::lifecycle::LifecycleError;
use crate::tail::{self, TailOptions};

/// GET /tasks/{job_id}/log
/// Stream the job's log file as plain text
pub async fn download_log(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let path = state.lifecycle.config().job_log_file(&job_id);
    tracing::debug!("Downloading log of job {}: {}", job_id, path.display());

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound("Log file not found".to_string()))?;
    let size = file.metadata().await.ok().map(|m| m.len());

    let mut response = Response::builder().header(header::CONTENT_TYPE, "text/plain; charset=utf-8");
    // A running job keeps appending; the body stops at the announced length
    let body = match size {
        Some(size) => {
            response = response.header(header::CONTENT_LENGTH, size);
            Body::from_stream(ReaderStream::new(file.take(size)))
        }
        None => Body::from_stream(ReaderStream::new(file)),
    };

    response
        .body(body)
        .map_err(|e| ApiError::InternalError(format!("Failed to build response: {}", e)))
}

/// GET /tasks/{job_id}/logs
/// Buffered output of the job's container
pub async fn container_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<String>> {
    tracing::debug!("Getting container logs of job {}", job_id);

    match state.lifecycle.logs(&job_id).await {
        Ok(logs) => Ok(Json(logs)),
        Err(LifecycleError::NotFound(_)) => {
            Err(ApiError::NotFound("Task Container Not Found".to_string()))
        }
        Err(e) => Err(ApiError::InternalError(format!(
            "Get container log failed: {}",
            e
        ))),
    }
}

/// GET /ws/logs/{job_id}
/// Push the job's log file line by line: the backlog, then live appends
pub async fn ws_logs(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let path = state.lifecycle.config().job_log_file(&job_id);
    let options = state.tail;
    ws.on_upgrade(move |socket| stream_log(socket, job_id, path, options))
}

async fn stream_log(socket: WebSocket, job_id: String, path: PathBuf, options: TailOptions) {
    tracing::info!("Log subscriber attached to job {}", job_id);

    let (mut sender, mut receiver) = socket.split();
    let mut lines = Box::pin(tail::follow(path, options));

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if sender.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Log of job {} unreadable: {}", job_id, e);
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                None => break,
            },
            inbound = receiver.next() => match inbound {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("Log subscriber detached from job {}", job_id);
}
