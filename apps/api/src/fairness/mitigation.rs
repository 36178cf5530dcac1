//! Advisory reweighting. Produces adjusted scores that would equalize group selection
//! rates; stored scores are never modified.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::metrics::FairnessAuditor;
use crate::models::application::ScoredApplication;
use crate::outcome::{FallbackReason, StageOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedScore {
    pub group: String,
    /// Normalized original score (`score / 100`).
    pub original_score: f64,
    /// `min(1.0, original_score * weight)`.
    pub adjusted_score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationReport {
    pub adjusted_scores: BTreeMap<Uuid, AdjustedScore>,
    pub weights: BTreeMap<String, f64>,
    pub overall_selection_rate: f64,
    pub protected_attribute: String,
}

/// Per-group weight = overall selection rate / group selection rate (1.0 for a group
/// nobody from was selected).
pub fn reweight(
    auditor: &FairnessAuditor,
    pool: &[ScoredApplication],
) -> StageOutcome<MitigationReport> {
    if pool.len() < auditor.thresholds().min_applications {
        return StageOutcome::Fallback(FallbackReason::InsufficientData {
            applications: pool.len(),
            groups: auditor.group_stats(pool).len(),
        });
    }

    let thresholds = auditor.thresholds();
    let selected = pool.iter().filter(|a| thresholds.is_selected(a.score)).count();
    let overall_selection_rate = selected as f64 / pool.len() as f64;

    let weights: BTreeMap<String, f64> = auditor
        .group_stats(pool)
        .into_iter()
        .map(|(label, stats)| {
            let weight = if stats.selection_rate > 0.0 {
                overall_selection_rate / stats.selection_rate
            } else {
                1.0
            };
            (label, weight)
        })
        .collect();

    let grouping = auditor.grouping();
    let adjusted_scores = pool
        .iter()
        .map(|application| {
            let group = grouping.group(application);
            let weight = weights.get(&group).copied().unwrap_or(1.0);
            let original_score = application.score / 100.0;
            (
                application.application_id,
                AdjustedScore {
                    group,
                    original_score,
                    adjusted_score: (original_score * weight).min(1.0),
                    weight,
                },
            )
        })
        .collect();

    info!(
        "Reweighted {} application(s) across {} group(s)",
        pool.len(),
        weights.len()
    );

    StageOutcome::Ok(MitigationReport {
        adjusted_scores,
        weights,
        overall_selection_rate,
        protected_attribute: grouping.name().to_string(),
    })
}
