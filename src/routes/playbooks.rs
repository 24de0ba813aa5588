//! Playbook routes: listing, reload and synchronous execution.

use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::models::playbook::Playbook;
use crate::models::value::Map;
use crate::services::loader::LoadResult;
use crate::services::orchestrator::PlaybookRun;
use crate::AppState;

/// Body of an execute request.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub inputs: Map,
}

/// GET /api/v1/playbooks
pub async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<Playbook>>> {
    let playbooks = state
        .orchestrator
        .list()
        .await
        .iter()
        .map(|p| p.as_ref().clone())
        .collect();
    ApiResponse::success(playbooks)
}

/// GET /api/v1/playbooks/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Playbook>>, AppError> {
    let playbook = state
        .orchestrator
        .playbook(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Playbook {id} not found")))?;
    Ok(ApiResponse::success(playbook.as_ref().clone()))
}

/// POST /api/v1/playbooks/reload: merge the playbooks directory over the current set.
pub async fn reload(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LoadResult>>>, AppError> {
    let results = state
        .orchestrator
        .load_playbooks(FsPath::new(&state.config.playbooks_dir))
        .await?;
    Ok(ApiResponse::success(results))
}

/// POST /api/v1/playbooks/:id/execute: run a playbook and wait for it to finish.
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<ApiResponse<PlaybookRun>>, AppError> {
    let run = state.orchestrator.execute(&id, body.inputs).await?;
    Ok(ApiResponse::success(run))
}
