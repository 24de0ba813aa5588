//! Health check endpoints for liveness and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::errors::ApiResponse;
use crate::AppState;

/// Readiness probe detail.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub store: String,
    pub rules: usize,
    pub playbooks: usize,
}

/// Liveness probe; always OK while the process is running.
pub async fn live() -> &'static str {
    "OK"
}

/// Readiness probe; 503 when the store cannot be reached.
pub async fn ready(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthStatus>>) {
    let (code, status, store) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok", "connected".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "degraded",
                format!("error: {e}"),
            )
        }
    };

    let body = HealthStatus {
        status: status.to_string(),
        store,
        rules: state.detection.rules().await.len(),
        playbooks: state.orchestrator.list().await.len(),
    };
    (code, ApiResponse::success(body))
}
