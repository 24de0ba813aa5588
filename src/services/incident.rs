//! Incident service: listing, lookup and analyst updates.

use uuid::Uuid;

use crate::db::store::Store;
use crate::errors::AppError;
use crate::models::incident::{Incident, IncidentFilters, IncidentStatus, UpdateIncident};
use crate::models::pagination::{PagedResult, Pagination};

/// List incidents, newest first.
pub async fn list(
    store: &dyn Store,
    filters: &IncidentFilters,
    pagination: &Pagination,
) -> Result<PagedResult<Incident>, AppError> {
    let (items, total) = store
        .list_incidents(filters, pagination.limit(), pagination.offset())
        .await?;
    Ok(PagedResult::new(items, total, pagination))
}

pub async fn find_by_id(store: &dyn Store, id: Uuid) -> Result<Incident, AppError> {
    store
        .get_incident(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Incident not found".to_string()))
}

/// Apply a partial update. Notes are appended to the existing log.
pub async fn update(
    store: &dyn Store,
    id: Uuid,
    update: &UpdateIncident,
) -> Result<Incident, AppError> {
    if update.is_empty() {
        return Err(AppError::Validation(
            "at least one of status, assigned_to or notes is required".to_string(),
        ));
    }

    let incident = store
        .update_incident(id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("Incident not found".to_string()))?;

    tracing::info!(
        incident_id = %id,
        status = ?incident.status,
        "Incident updated"
    );
    Ok(incident)
}

pub async fn resolve(store: &dyn Store, id: Uuid) -> Result<Incident, AppError> {
    let change = UpdateIncident {
        status: Some(IncidentStatus::Resolved),
        ..Default::default()
    };
    update(store, id, &change).await
}
