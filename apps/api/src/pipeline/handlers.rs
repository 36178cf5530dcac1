use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{ApplicationRow, ApplicationStatus};
use crate::pipeline::reprocess::{reprocess, ReprocessSelection, ReprocessSummary};
use crate::pipeline::PipelineRun;
use crate::state::AppState;

async fn load_application(state: &AppState, id: Uuid) -> Result<ApplicationRow, AppError> {
    state
        .store
        .fetch_application(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))
}

/// GET /api/v1/applications/:id
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationRow>, AppError> {
    Ok(Json(load_application(&state, id).await?))
}

/// POST /api/v1/applications/:id/process
pub async fn handle_process_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineRun>, AppError> {
    let run = state.pipeline.process(id).await?;
    Ok(Json(run))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
    pub notes: Option<String>,
}

/// PATCH /api/v1/applications/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<ApplicationRow>, AppError> {
    state
        .store
        .set_review(id, req.status, req.notes.as_deref())
        .await?;
    info!("Application {id} moved to {}", req.status);
    Ok(Json(load_application(&state, id).await?))
}

/// POST /api/v1/pipeline/reprocess
pub async fn handle_reprocess(
    State(state): State<AppState>,
    Json(selection): Json<ReprocessSelection>,
) -> Result<Json<ReprocessSummary>, AppError> {
    if selection.limit == 0 {
        return Err(AppError::Validation("limit must be at least 1".to_string()));
    }
    let summary = reprocess(&state.pipeline, selection, state.config.pipeline_concurrency).await?;
    Ok(Json(summary))
}
