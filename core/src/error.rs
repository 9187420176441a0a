use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error kinds surfaced at the backend's HTTP boundary.
///
/// Ingest validation and status transitions are mandatory paths and must
/// surface; LLM/notifier/metrics failures are optional paths and are logged
/// and swallowed by their callers instead of reaching this type.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("upstream dependency failed: {0}")]
    Upstream(String),

    #[error("internal error ({error_id}): {source}")]
    Internal {
        error_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CoreError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        let error_id = uuid::Uuid::new_v4().to_string();
        let source = err.into();
        tracing::error!(error_id = %error_id, error = %source, "internal_error");
        CoreError::Internal { error_id, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Upstream(_) => StatusCode::BAD_GATEWAY,
            CoreError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            CoreError::Internal { error_id, .. } => json!({
                "error": "internal",
                "error_id": error_id,
                "message": self.to_string(),
            }),
            CoreError::InvalidTransition { from, to } => json!({
                "error": "invalid_transition",
                "from": from,
                "to": to,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".into()),
            other => CoreError::internal(other),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::internal(err)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
