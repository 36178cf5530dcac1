use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::fairness::mitigation::{reweight, MitigationReport};
use crate::fairness::FairnessReport;
use crate::outcome::StageOutcome;
use crate::state::AppState;

async fn ensure_job(state: &AppState, job_id: Uuid) -> Result<(), AppError> {
    state
        .store
        .fetch_job(job_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))
}

/// GET /api/v1/jobs/:id/fairness
/// On-demand audit of the job's scored pool. Not persisted.
pub async fn handle_job_fairness(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<FairnessReport>, AppError> {
    ensure_job(&state, job_id).await?;
    let pool = state.store.scored_pool(job_id).await?;
    Ok(Json(state.auditor.audit_report(job_id, &pool)))
}

/// POST /api/v1/jobs/:id/mitigate
/// Advisory reweighting; stored scores are untouched.
pub async fn handle_job_mitigation(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<MitigationReport>, AppError> {
    ensure_job(&state, job_id).await?;
    let pool = state.store.scored_pool(job_id).await?;
    match reweight(&state.auditor, &pool) {
        StageOutcome::Ok(report) => Ok(Json(report)),
        StageOutcome::Fallback(reason) => Err(AppError::UnprocessableEntity(reason.message())),
    }
}
