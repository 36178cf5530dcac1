//! Fairness Auditor: group-fairness statistics over a job's applicant pool.
//!
//! Two interchangeable backends implement `FairnessBackend`:
//! - `LocalFairness`: in-process statistics (`metrics::FairnessAuditor`). Default.
//! - `RemoteFairness`: the external audit service, normalized at the boundary.
//!
//! The pipeline holds an `Arc<dyn FairnessBackend>` chosen at startup from config.

pub mod grouping;
pub mod handlers;
pub mod metrics;
pub mod mitigation;
pub mod remote;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::application::ScoredApplication;
use crate::outcome::{FallbackReason, StageOutcome};

pub use metrics::FairnessAuditor;
pub use remote::RemoteFairness;

// ────────────────────────────────────────────────────────────────────────────
// Report model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub selection_rate: f64,
}

/// Fairness audit result persisted on an application.
///
/// Always fully populated. When the audit could not run, `is_fallback` is set, both
/// metrics are `None`, and `fallback_reason` carries the machine-readable cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessReport {
    pub groups: BTreeMap<String, GroupStats>,
    pub disparate_impact_ratio: Option<f64>,
    pub demographic_parity_difference: Option<f64>,
    pub is_fair: bool,
    pub is_fallback: bool,
    pub message: String,
    pub fallback_reason: Option<String>,
    pub total_applications: usize,
    pub protected_attribute: String,
    pub decision_threshold: f64,
    pub suggested_actions: Vec<String>,
}

const FALLBACK_ACTIONS: &[&str] = &[
    "Review applications manually for potential biases",
    "Ensure diverse hiring panels are in place",
    "Use structured interviews and evaluation criteria",
];

impl FairnessReport {
    /// Degraded report for `reason`. `is_fair` stays `true`: with no metrics there is no
    /// evidence of unfairness, and the flag is only meaningful alongside `is_fallback`.
    pub fn fallback(
        reason: &FallbackReason,
        total_applications: usize,
        protected_attribute: &str,
        decision_threshold: f64,
    ) -> Self {
        let mut suggested_actions: Vec<String> =
            FALLBACK_ACTIONS.iter().map(|s| s.to_string()).collect();
        if reason.is_service_unavailable() {
            suggested_actions.insert(0, "Fairness service is currently unavailable".to_string());
        }

        Self {
            groups: BTreeMap::new(),
            disparate_impact_ratio: None,
            demographic_parity_difference: None,
            is_fair: true,
            is_fallback: true,
            message: reason.message(),
            fallback_reason: Some(reason.code().to_string()),
            total_applications,
            protected_attribute: protected_attribute.to_string(),
            decision_threshold,
            suggested_actions,
        }
    }

    pub fn from_outcome(
        outcome: StageOutcome<FairnessReport>,
        total_applications: usize,
        protected_attribute: &str,
        decision_threshold: f64,
    ) -> Self {
        outcome.unwrap_or_fallback(|reason| {
            Self::fallback(
                &reason,
                total_applications,
                protected_attribute,
                decision_threshold,
            )
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Thresholds
// ────────────────────────────────────────────────────────────────────────────

/// Decision threshold and fairness band. The band values come from the four-fifths
/// convention and have never been calibrated for this data, so they are configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessThresholds {
    /// Normalized score (`score / 100`) at or above which an application counts as selected.
    pub decision_threshold: f64,
    pub di_min: f64,
    pub di_max: f64,
    pub parity_max: f64,
    pub min_applications: usize,
    pub min_groups: usize,
}

impl Default for FairnessThresholds {
    fn default() -> Self {
        Self {
            decision_threshold: 0.5,
            di_min: 0.8,
            di_max: 1.25,
            parity_max: 0.1,
            min_applications: 2,
            min_groups: 2,
        }
    }
}

impl FairnessThresholds {
    /// `score` is on the 0–100 scale.
    pub fn is_selected(&self, score: f64) -> bool {
        score / 100.0 >= self.decision_threshold
    }

    /// Lenient verdict: a missing metric is not evidence of unfairness, so only metrics
    /// that are present can fail the check.
    pub fn is_fair(&self, disparate_impact: Option<f64>, parity_difference: Option<f64>) -> bool {
        let di_ok = disparate_impact
            .map(|di| di >= self.di_min && di <= self.di_max)
            .unwrap_or(true);
        let dpd_ok = parity_difference
            .map(|dpd| dpd.abs() <= self.parity_max)
            .unwrap_or(true);
        di_ok && dpd_ok
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Backend trait
// ────────────────────────────────────────────────────────────────────────────

/// Everything a backend may need to audit one application against its job's pool.
#[derive(Debug, Clone)]
pub struct AuditRequest<'a> {
    pub job_id: Uuid,
    pub application_id: Uuid,
    /// The application's own score (0–100).
    pub score: f64,
    /// Every scored application of the job, the current one included.
    pub pool: &'a [ScoredApplication],
}

#[async_trait]
pub trait FairnessBackend: Send + Sync {
    /// Backend label for logs and the dependency health view.
    fn name(&self) -> &'static str;

    /// Name of the grouping attribute reports are produced under.
    fn protected_attribute(&self) -> &str;

    fn decision_threshold(&self) -> f64;

    async fn audit(&self, request: &AuditRequest<'_>) -> StageOutcome<FairnessReport>;
}

/// In-process backend: runs `FairnessAuditor` directly.
pub struct LocalFairness {
    auditor: FairnessAuditor,
}

impl LocalFairness {
    pub fn new(auditor: FairnessAuditor) -> Self {
        Self { auditor }
    }
}

#[async_trait]
impl FairnessBackend for LocalFairness {
    fn name(&self) -> &'static str {
        "local"
    }

    fn protected_attribute(&self) -> &str {
        self.auditor.grouping().name()
    }

    fn decision_threshold(&self) -> f64 {
        self.auditor.thresholds().decision_threshold
    }

    async fn audit(&self, request: &AuditRequest<'_>) -> StageOutcome<FairnessReport> {
        self.auditor.audit(request.job_id, request.pool)
    }
}
