//! Unified error handling with consistent API response envelope.
//!
//! Engine-level failures (storage, definition loading, action dispatch,
//! playbook runs) each have their own enum; [`AppError`] folds them into
//! HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error detail in the API response envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Consistent JSON envelope for all API responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a successful result in the envelope.
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            data: Some(data),
            error: None,
        })
    }

    /// Wrap an error in the envelope.
    pub fn error(code: &str, message: &str) -> Json<Self> {
        Json(Self {
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        })
    }
}

/// Persistence failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Definition loading failure.
///
/// Only `Directory` escapes a load; the per-file variants are folded into
/// `LoadStatus::Failed` entries and the scan continues.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Cannot read definition directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Failure returned by the action dispatcher or a handler.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("process failed: {0}")]
    Process(String),

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("action log unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("incident store failed: {0}")]
    Incident(StoreError),
}

/// Run-level playbook failure.
#[derive(Debug, thiserror::Error)]
pub enum PlaybookError {
    #[error("playbook not found: {0}")]
    NotFound(String),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("step {step_id} failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: ActionError,
    },
}

/// The detection queue's consumer has stopped.
#[derive(Debug, thiserror::Error)]
#[error("detection queue is closed")]
pub struct QueueClosed;

/// Application error type mapping to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Playbook(#[from] PlaybookError),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(e))
    }
}

impl From<QueueClosed> for AppError {
    fn from(e: QueueClosed) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg.clone())
            }
            AppError::Playbook(PlaybookError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string())
            }
            AppError::Playbook(PlaybookError::MissingInput(_)) => {
                (StatusCode::BAD_REQUEST, "MISSING_INPUT", self.to_string())
            }
            AppError::Playbook(PlaybookError::StepFailed { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "STEP_FAILED",
                self.to_string(),
            ),
            AppError::Load(e) => {
                tracing::error!(error = %e, "Definition load error");
                (StatusCode::INTERNAL_SERVER_ERROR, "LOAD_ERROR", e.to_string())
            }
            AppError::Store(e) => {
                tracing::error!(error = %e, "Store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, ApiResponse::<()>::error(code, &message)).into_response()
    }
}
