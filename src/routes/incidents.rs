//! Incident routes: listing, detail, analyst updates and resolution.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::incident::{Incident, IncidentFilters, UpdateIncident};
use crate::models::pagination::{PagedResult, Pagination};
use crate::services::incident as incident_service;
use crate::AppState;

/// GET /api/v1/incidents: list incidents with status/severity filters.
pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filters): Query<IncidentFilters>,
) -> Result<Json<ApiResponse<PagedResult<Incident>>>, AppError> {
    let result = incident_service::list(state.store.as_ref(), &filters, &pagination).await?;
    Ok(ApiResponse::success(result))
}

/// GET /api/v1/incidents/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Incident>>, AppError> {
    let incident = incident_service::find_by_id(state.store.as_ref(), id).await?;
    Ok(ApiResponse::success(incident))
}

/// PATCH /api/v1/incidents/:id: update status, assignee, or append a note.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateIncident>,
) -> Result<Json<ApiResponse<Incident>>, AppError> {
    let incident = incident_service::update(state.store.as_ref(), id, &body).await?;
    Ok(ApiResponse::success(incident))
}

/// POST /api/v1/incidents/:id/resolve
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Incident>>, AppError> {
    let incident = incident_service::resolve(state.store.as_ref(), id).await?;
    Ok(ApiResponse::success(incident))
}
