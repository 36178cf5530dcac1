//! In-process fairness statistics over a job's scored applicant pool.
//!
//! Algorithm:
//! 1. Group each application with the configured `GroupingAttribute`.
//! 2. Selection rate per group = share of the group with `score / 100 >= decision_threshold`.
//! 3. disparate impact = min(rate) / max(rate); demographic parity difference = max − min.
//! 4. Fair when both metrics sit inside the configured band.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::grouping::{ExperienceBuckets, GroupingAttribute};
use super::{FairnessReport, FairnessThresholds, GroupStats};
use crate::models::application::ScoredApplication;
use crate::outcome::{FallbackReason, StageOutcome};

/// Per-group counts before rates are derived.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    count: usize,
    selected: usize,
}

/// Computes group-fairness statistics. Cheap to clone; holds no per-job state.
#[derive(Clone)]
pub struct FairnessAuditor {
    thresholds: FairnessThresholds,
    grouping: Arc<dyn GroupingAttribute>,
}

impl FairnessAuditor {
    pub fn new(thresholds: FairnessThresholds, grouping: Arc<dyn GroupingAttribute>) -> Self {
        Self {
            thresholds,
            grouping,
        }
    }

    pub fn thresholds(&self) -> &FairnessThresholds {
        &self.thresholds
    }

    pub fn grouping(&self) -> &dyn GroupingAttribute {
        self.grouping.as_ref()
    }

    /// Selection rate and size of every group in the pool, keyed by group label.
    pub fn group_stats(&self, pool: &[ScoredApplication]) -> BTreeMap<String, GroupStats> {
        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for application in pool {
            let tally = tallies
                .entry(self.grouping.group(application))
                .or_default();
            tally.count += 1;
            if self.thresholds.is_selected(application.score) {
                tally.selected += 1;
            }
        }

        tallies
            .into_iter()
            .map(|(label, t)| {
                (
                    label,
                    GroupStats {
                        count: t.count,
                        selection_rate: t.selected as f64 / t.count as f64,
                    },
                )
            })
            .collect()
    }

    /// Audits the pool. Falls back on too few applications or groups, or when no group
    /// is ever selected (the ratio has no denominator).
    pub fn audit(&self, job_id: Uuid, pool: &[ScoredApplication]) -> StageOutcome<FairnessReport> {
        let groups = self.group_stats(pool);

        if pool.len() < self.thresholds.min_applications || groups.len() < self.thresholds.min_groups
        {
            debug!(
                "Fairness audit for job {job_id}: {} application(s), {} group(s) - insufficient",
                pool.len(),
                groups.len()
            );
            return StageOutcome::Fallback(FallbackReason::InsufficientData {
                applications: pool.len(),
                groups: groups.len(),
            });
        }

        let (min_rate, max_rate) = groups.values().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), g| (lo.min(g.selection_rate), hi.max(g.selection_rate)),
        );

        if max_rate == 0.0 {
            return StageOutcome::Fallback(FallbackReason::UndefinedRatio);
        }

        let disparate_impact_ratio = min_rate / max_rate;
        let demographic_parity_difference = max_rate - min_rate;
        let is_fair = self
            .thresholds
            .is_fair(Some(disparate_impact_ratio), Some(demographic_parity_difference));

        info!(
            "Fairness audit completed for job {job_id}: di={disparate_impact_ratio:.3} dpd={demographic_parity_difference:.3} fair={is_fair}"
        );

        StageOutcome::Ok(FairnessReport {
            groups,
            disparate_impact_ratio: Some(disparate_impact_ratio),
            demographic_parity_difference: Some(demographic_parity_difference),
            is_fair,
            is_fallback: false,
            message: format!(
                "Fairness audit completed over {} application(s)",
                pool.len()
            ),
            fallback_reason: None,
            total_applications: pool.len(),
            protected_attribute: self.grouping.name().to_string(),
            decision_threshold: self.thresholds.decision_threshold,
            suggested_actions: Vec::new(),
        })
    }

    /// Like `audit`, but always returns a well-formed report.
    pub fn audit_report(&self, job_id: Uuid, pool: &[ScoredApplication]) -> FairnessReport {
        let outcome = self.audit(job_id, pool);
        FairnessReport::from_outcome(
            outcome,
            pool.len(),
            self.grouping.name(),
            self.thresholds.decision_threshold,
        )
    }
}

impl Default for FairnessAuditor {
    fn default() -> Self {
        Self::new(FairnessThresholds::default(), Arc::new(ExperienceBuckets))
    }
}
