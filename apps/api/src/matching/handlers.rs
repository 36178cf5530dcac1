use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::{rank_candidates, RankedCandidate};
use crate::state::AppState;

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Deserialize)]
pub struct TopKQuery {
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct MatchesResponse {
    pub job_id: Uuid,
    pub matches: Vec<RankedCandidate>,
    pub count: usize,
}

/// GET /api/v1/jobs/:id/matches?top_k=K
/// Embeds the job first if it has no embedding yet.
pub async fn handle_job_matches(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(params): Query<TopKQuery>,
) -> Result<Json<MatchesResponse>, AppError> {
    let top_k = params.top_k.unwrap_or(DEFAULT_TOP_K);
    if top_k == 0 {
        return Err(AppError::Validation("top_k must be at least 1".to_string()));
    }

    let job = state
        .store
        .fetch_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let embedding = match job.embedding.as_ref().filter(|e| !e.is_empty()) {
        Some(embedding) => embedding.clone(),
        None => match state.encoder.embed(&job.text()).await {
            Ok(embedding) => {
                state.store.set_job_embedding(job_id, &embedding).await?;
                embedding
            }
            Err(e) => {
                warn!("Could not embed job {job_id}: {e}");
                return Err(AppError::UnprocessableEntity(format!(
                    "Job {job_id} has no embedding and none could be generated"
                )));
            }
        },
    };

    let candidates = state.store.match_candidates(job_id).await?;
    let matches = rank_candidates(&embedding, candidates, top_k);
    info!("Found {} match(es) for job {job_id}", matches.len());

    Ok(Json(MatchesResponse {
        job_id,
        count: matches.len(),
        matches,
    }))
}
