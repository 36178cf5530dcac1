//! Similarity Matcher: cosine similarity between job and résumé embeddings.
//!
//! Pure functions, no I/O. The score is `similarity * 100` and is deliberately not
//! clamped: adversarial vectors may produce values below 0.

pub mod handlers;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Result of matching one job embedding against one résumé embedding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome {
    Score(f64),
    /// One side is absent, empty, or the dimensions disagree. Not an error: the caller
    /// keeps whatever score it had before.
    MissingEmbedding,
}

impl MatchOutcome {
    pub fn score(self) -> Option<f64> {
        match self {
            MatchOutcome::Score(s) => Some(s),
            MatchOutcome::MissingEmbedding => None,
        }
    }
}

/// Cosine similarity in `[-1, 1]`. Returns `0.0` when either norm is zero.
///
/// Accumulates in `f64` in index order, so the same pair always yields the same bits.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Scores a (job, résumé) embedding pair on the 0–100 scale.
pub fn match_embeddings(job: Option<&[f32]>, resume: Option<&[f32]>) -> MatchOutcome {
    let (job, resume) = match (job, resume) {
        (Some(j), Some(r)) if !j.is_empty() && !r.is_empty() => (j, r),
        _ => return MatchOutcome::MissingEmbedding,
    };

    if job.len() != resume.len() {
        warn!(
            "Embedding dimension mismatch: job={} resume={}",
            job.len(),
            resume.len()
        );
        return MatchOutcome::MissingEmbedding;
    }

    let similarity = cosine_similarity(job, resume);
    if !similarity.is_finite() {
        warn!("Embedding pair produced a non-finite similarity");
        return MatchOutcome::MissingEmbedding;
    }
    MatchOutcome::Score(similarity * 100.0)
}

// ────────────────────────────────────────────────────────────────────────────
// Top-K ranking
// ────────────────────────────────────────────────────────────────────────────

/// A résumé eligible for ranking against a job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MatchCandidate {
    pub resume_id: Uuid,
    pub candidate_id: Uuid,
    pub embedding: Vec<f32>,
    pub skills: Vec<String>,
    pub education: Vec<String>,
    pub experience_years: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub resume_id: Uuid,
    pub candidate_id: Uuid,
    pub score: f64,
    pub skills: Vec<String>,
    pub education: Vec<String>,
    pub experience_years: Option<i32>,
}

/// Ranks candidates against a job: score descending, ties by ascending résumé id.
/// Candidates whose embedding cannot be matched are dropped.
pub fn rank_candidates(
    job_embedding: &[f32],
    candidates: Vec<MatchCandidate>,
    top_k: usize,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .filter_map(|c| {
            let score =
                match_embeddings(Some(job_embedding), Some(c.embedding.as_slice())).score()?;
            Some(RankedCandidate {
                resume_id: c.resume_id,
                candidate_id: c.candidate_id,
                score,
                skills: c.skills,
                education: c.education,
                experience_years: c.experience_years,
            })
        })
        .collect();

    ranked.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.resume_id.cmp(&b.resume_id),
        other => other,
    });
    ranked.truncate(top_k);
    ranked
}
