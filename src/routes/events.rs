//! Event routes: ingestion and lookup.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::event::{CreateEvent, Event, EventFilters};
use crate::models::pagination::{PagedResult, Pagination};
use crate::services::event as event_service;
use crate::AppState;

/// POST /api/v1/events: store an event and queue it for detection.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateEvent>,
) -> Result<(StatusCode, Json<ApiResponse<Event>>), AppError> {
    let event = event_service::ingest(state.store.as_ref(), &state.queue, body).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(event)))
}

/// GET /api/v1/events: list events, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filters): Query<EventFilters>,
) -> Result<Json<ApiResponse<PagedResult<Event>>>, AppError> {
    let result = event_service::list(state.store.as_ref(), &filters, &pagination).await?;
    Ok(ApiResponse::success(result))
}

/// GET /api/v1/events/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Event>>, AppError> {
    let event = event_service::find_by_id(state.store.as_ref(), id).await?;
    Ok(ApiResponse::success(event))
}
