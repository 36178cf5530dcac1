//! Explanation Generator: feature-level rationale for a match score.
//!
//! Default backend is `LocalExplainer` (curated keyword vocabulary, deterministic).
//! `RemoteExplainer` calls the external explain port and normalizes its payload.
//! The pipeline holds an `Arc<dyn ExplanationBackend>` chosen at startup from config.

pub mod keywords;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matching::{match_embeddings, MatchOutcome};
use crate::outcome::{FallbackReason, StageOutcome};

pub use remote::RemoteExplainer;

// ────────────────────────────────────────────────────────────────────────────
// Result model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub label: String,
    pub weight: f64,
}

impl FeatureWeight {
    pub fn new(label: &str, weight: f64) -> Self {
        Self {
            label: label.to_string(),
            weight,
        }
    }
}

/// Explanation persisted on an application. Fallbacks keep the same shape with
/// `is_fallback` set and non-empty `features` and `rationale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationResult {
    pub features: Vec<FeatureWeight>,
    pub predicted_score: f64,
    pub is_fallback: bool,
    pub summary: String,
    pub rationale: Vec<String>,
    pub fallback_reason: Option<String>,
}

const GENERIC_RATIONALE: &[&str] = &[
    "The match score is based on keyword matching and semantic similarity between the job requirements and resume content.",
    "Key factors considered include: skills match, experience relevance, and education alignment with job requirements.",
    "For a more detailed analysis, please try again later when the explainability service is available.",
];

const GENERIC_FEATURES: &[&str] = &["skills match", "experience relevance", "education alignment"];

impl ExplanationResult {
    pub fn fallback(reason: &FallbackReason, predicted_score: f64) -> Self {
        let mut rationale = Vec::with_capacity(GENERIC_RATIONALE.len() + 2);
        rationale.push(cause_line(reason));
        if reason.is_service_unavailable() || matches!(reason, FallbackReason::Disabled { .. }) {
            rationale.push(
                "This is a fallback explanation because the explainability service is currently unavailable."
                    .to_string(),
            );
        }
        rationale.extend(GENERIC_RATIONALE.iter().map(|s| s.to_string()));

        Self {
            features: GENERIC_FEATURES
                .iter()
                .map(|label| FeatureWeight::new(label, 0.0))
                .collect(),
            predicted_score,
            is_fallback: true,
            summary: format!("Fallback explanation: {}", reason.message()),
            rationale,
            fallback_reason: Some(reason.code().to_string()),
        }
    }

    pub fn from_outcome(outcome: StageOutcome<ExplanationResult>, predicted_score: f64) -> Self {
        outcome.unwrap_or_fallback(|reason| Self::fallback(&reason, predicted_score))
    }
}

fn cause_line(reason: &FallbackReason) -> String {
    match reason {
        FallbackReason::Timeout { .. } => {
            "Explanation service timed out - showing fallback explanation.".to_string()
        }
        FallbackReason::ServiceError { status, .. } => {
            format!("Explanation service error - status {status}.")
        }
        FallbackReason::TransportError { detail, .. } => {
            format!("Explanation service error - {detail}.")
        }
        FallbackReason::MalformedPayload { .. } => {
            "Explanation service returned data that could not be read.".to_string()
        }
        FallbackReason::InsufficientText { field } => {
            format!("No {} content available for analysis.", field.replace('_', " "))
        }
        FallbackReason::Disabled { .. } => "Explanation service is disabled.".to_string(),
        other => other.message(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Backend trait
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExplainRequest<'a> {
    pub job_id: Uuid,
    pub resume_id: Uuid,
    pub job_text: &'a str,
    pub resume_text: &'a str,
    /// Score the explanation is reported against (0–100).
    pub predicted_score: f64,
}

#[async_trait]
pub trait ExplanationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn explain(&self, request: &ExplainRequest<'_>) -> StageOutcome<ExplanationResult>;
}

/// Caller-supplied score, else similarity recomputed from the embeddings, else 0.
pub fn predicted_score(score: Option<f64>, job: Option<&[f32]>, resume: Option<&[f32]>) -> f64 {
    score
        .or_else(|| match match_embeddings(job, resume) {
            MatchOutcome::Score(s) => Some(s),
            MatchOutcome::MissingEmbedding => None,
        })
        .unwrap_or(0.0)
}

/// In-process keyword explainer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExplainer;

#[async_trait]
impl ExplanationBackend for LocalExplainer {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn explain(&self, request: &ExplainRequest<'_>) -> StageOutcome<ExplanationResult> {
        keywords::explain(request.job_text, request.resume_text, request.predicted_score)
    }
}
