//! Rule set routes.

use std::path::Path;

use axum::{extract::State, Json};

use crate::errors::{ApiResponse, AppError};
use crate::models::rule::Rule;
use crate::services::loader::LoadResult;
use crate::AppState;

/// GET /api/v1/rules: the currently published rule set, in evaluation order.
pub async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<Rule>>> {
    let rules = state.detection.rules().await;
    ApiResponse::success(rules.as_ref().clone())
}

/// POST /api/v1/rules/reload: re-read the rules directory and replace the set.
pub async fn reload(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LoadResult>>>, AppError> {
    let results = state
        .detection
        .load_rules(Path::new(&state.config.rules_dir))
        .await?;
    Ok(ApiResponse::success(results))
}
