//! Action log routes.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::errors::{ApiResponse, AppError};
use crate::models::action_log::{ActionLog, ActionLogFilters};
use crate::models::pagination::{PagedResult, Pagination};
use crate::AppState;

/// GET /api/v1/actions: dispatcher audit log, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filters): Query<ActionLogFilters>,
) -> Result<Json<ApiResponse<PagedResult<ActionLog>>>, AppError> {
    let (items, total) = state
        .store
        .list_actions(&filters, pagination.limit(), pagination.offset())
        .await?;
    Ok(ApiResponse::success(PagedResult::new(
        items,
        total,
        &pagination,
    )))
}
