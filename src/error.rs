use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("request already completed")]
    AlreadyCompleted,

    #[error("completion code does not match")]
    CodeMismatch,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable identifier handed to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyCompleted => "already_completed",
            AppError::CodeMismatch => "code_mismatch",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::AlreadyCompleted => StatusCode::CONFLICT,
            AppError::CodeMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::InvalidInput(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg)
            | AppError::UpstreamUnavailable(msg) => msg.clone(),
            AppError::AlreadyCompleted | AppError::CodeMismatch => self.to_string(),
            AppError::Internal(_) => "internal server error".to_string(),
        };

        if let AppError::Internal(detail) = &self {
            tracing::error!(error = %detail, "internal error");
        }

        let body = Json(json!({
            "status": "error",
            "kind": self.kind(),
            "error": message
        }));

        (status, body).into_response()
    }
}
