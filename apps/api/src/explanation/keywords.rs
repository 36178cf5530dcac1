//! Keyword explainer over a fixed vocabulary of domain terms.
//!
//! Algorithm:
//! 1. Tokenize job and résumé text (lowercase; split on anything but alphanumerics, `+`, `#`).
//! 2. For each vocabulary term found in the job text: `+0.1` when the résumé also has
//!    it, `-0.05` when it does not. Terms missing from the job text are not scored.
//! 3. Summary reports the similarity (`score / 100`) and the number of distinct tokens
//!    the two texts share.

use std::collections::BTreeSet;

use tracing::debug;

use super::{ExplanationResult, FeatureWeight};
use crate::outcome::{FallbackReason, StageOutcome};

pub const VOCABULARY: &[&str] = &[
    "python",
    "java",
    "javascript",
    "react",
    "sql",
    "docker",
    "kubernetes",
    "aws",
    "machine learning",
    "experience",
    "education",
    "certification",
    "project",
    "skill",
];

pub const MATCH_WEIGHT: f64 = 0.1;
pub const MISSING_WEIGHT: f64 = -0.05;

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when every word of `term` appears as consecutive tokens. A trailing `s` on a
/// token is accepted, so `skill` matches `skills` while `java` never matches `javascript`.
fn contains_term(tokens: &[String], term: &str) -> bool {
    let parts: Vec<&str> = term.split_whitespace().collect();
    if parts.is_empty() || parts.len() > tokens.len() {
        return false;
    }

    tokens.windows(parts.len()).any(|window| {
        window
            .iter()
            .zip(&parts)
            .all(|(token, part)| token == part || token.strip_suffix('s') == Some(*part))
    })
}

pub fn explain(job_text: &str, resume_text: &str, predicted_score: f64) -> StageOutcome<ExplanationResult> {
    let job_tokens = tokenize(job_text);
    if job_tokens.is_empty() {
        return StageOutcome::Fallback(FallbackReason::InsufficientText {
            field: "job_text".to_string(),
        });
    }
    let resume_tokens = tokenize(resume_text);
    if resume_tokens.is_empty() {
        return StageOutcome::Fallback(FallbackReason::InsufficientText {
            field: "resume_text".to_string(),
        });
    }

    let mut features = Vec::new();
    let mut rationale = Vec::new();
    for term in VOCABULARY {
        if !contains_term(&job_tokens, term) {
            continue;
        }
        if contains_term(&resume_tokens, term) {
            features.push(FeatureWeight::new(term, MATCH_WEIGHT));
            rationale.push(format!("Resume covers '{term}' from the job requirements."));
        } else {
            features.push(FeatureWeight::new(term, MISSING_WEIGHT));
            rationale.push(format!("Job mentions '{term}' but the resume does not."));
        }
    }

    let job_set: BTreeSet<&str> = job_tokens.iter().map(String::as_str).collect();
    let resume_set: BTreeSet<&str> = resume_tokens.iter().map(String::as_str).collect();
    let common = job_set.intersection(&resume_set).count();

    debug!(
        "Keyword explanation: {} feature(s), {common} common term(s)",
        features.len()
    );

    StageOutcome::Ok(ExplanationResult {
        features,
        predicted_score,
        is_fallback: false,
        summary: format!(
            "Match score of {:.3} based on {common} common terms",
            predicted_score / 100.0
        ),
        rationale,
        fallback_reason: None,
    })
}
