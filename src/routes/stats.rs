//! Row counts for the dashboard header.

use axum::{extract::State, Json};

use crate::db::store::Stats;
use crate::errors::{ApiResponse, AppError};
use crate::AppState;

/// GET /api/v1/stats
pub async fn get(State(state): State<AppState>) -> Result<Json<ApiResponse<Stats>>, AppError> {
    let stats = state.store.stats().await?;
    Ok(ApiResponse::success(stats))
}
