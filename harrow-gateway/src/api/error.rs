//! API Error Handling
//!
//! Agent errors keep the agent's status code where there is one.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use harrow_client::ClientError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    /// The agent answered with an error status
    Upstream(StatusCode, String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upstream(status, msg) => {
                tracing::warn!("Agent error ({}): {}", status, msg);
                (status, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "detail": message }))).into_response()
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::AgentUnavailable(_) => {
                ApiError::InternalError("Agent is not running".to_string())
            }
            ClientError::ApiError { status, message } => ApiError::Upstream(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                format!("Agent error: {}", message),
            ),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
