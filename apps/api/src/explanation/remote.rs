//! Remote explain backend.
//!
//! The explain port answers in several shapes depending on its version: `explanation`
//! may be `[[feature, weight], ...]`, a list of sentences, a single sentence, or an
//! object holding `feature_importance`. All of them are normalized here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ExplainRequest, ExplanationBackend, ExplanationResult, FeatureWeight};
use crate::enrichment::EnrichmentClient;
use crate::outcome::{FallbackReason, StageOutcome};

#[derive(Debug, Serialize)]
struct ExplainPayload {
    text: String,
    job_id: Uuid,
    resume_id: Uuid,
    score: f64,
}

pub struct RemoteExplainer {
    client: EnrichmentClient,
}

impl RemoteExplainer {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: EnrichmentClient::new("explainability_service", base_url, timeout),
        }
    }

    pub fn client(&self) -> &EnrichmentClient {
        &self.client
    }
}

#[async_trait]
impl ExplanationBackend for RemoteExplainer {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn explain(&self, request: &ExplainRequest<'_>) -> StageOutcome<ExplanationResult> {
        if request.job_text.trim().is_empty() {
            return StageOutcome::Fallback(FallbackReason::InsufficientText {
                field: "job_text".to_string(),
            });
        }
        if request.resume_text.trim().is_empty() {
            return StageOutcome::Fallback(FallbackReason::InsufficientText {
                field: "resume_text".to_string(),
            });
        }

        let payload = ExplainPayload {
            text: format!("Job: {}\nResume: {}", request.job_text, request.resume_text),
            job_id: request.job_id,
            resume_id: request.resume_id,
            score: request.predicted_score,
        };

        match self.client.post_json("/explain", &payload).await {
            Ok(body) => {
                let outcome =
                    normalize_explain_payload(self.client.service(), &body, request.predicted_score);
                if !outcome.is_fallback() {
                    info!(
                        "Remote explanation received for job {} / resume {}",
                        request.job_id, request.resume_id
                    );
                }
                outcome
            }
            Err(e) => e.into(),
        }
    }
}

/// Normalizes a raw explain response. The result always carries `supplied_score`; a remote
/// `prediction` may be on another scale and is only logged.
pub fn normalize_explain_payload(
    service: &str,
    body: &Value,
    supplied_score: f64,
) -> StageOutcome<ExplanationResult> {
    let malformed = |detail: String| {
        StageOutcome::Fallback(FallbackReason::MalformedPayload {
            service: service.to_string(),
            detail,
        })
    };

    let Some(root) = body.as_object() else {
        return malformed("expected a JSON object".to_string());
    };
    if let Some(error) = root.get("error") {
        return malformed(format!("service reported error: {error}"));
    }

    match root.get("prediction") {
        None | Some(Value::Null) => {}
        Some(v) => match v.as_f64().filter(|f| f.is_finite()) {
            Some(f) => debug!("{service} predicted {f}, keeping supplied score {supplied_score}"),
            None => return malformed("'prediction' is not a number".to_string()),
        },
    }
    let predicted_score = supplied_score;

    let mut features = Vec::new();
    let mut rationale = Vec::new();
    let mut summary = root
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string);

    match root.get("explanation") {
        Some(Value::String(s)) => rationale.push(s.clone()),
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) => rationale.push(s.clone()),
                    Value::Array(pair) => match parse_pair(pair) {
                        Some(feature) => features.push(feature),
                        None => return malformed(format!("explanation[{i}] is not a [feature, weight] pair")),
                    },
                    _ => return malformed(format!("explanation[{i}] has an unsupported type")),
                }
            }
        }
        Some(Value::Object(nested)) => {
            if let Some(Value::Object(importance)) = nested.get("feature_importance") {
                for (label, weight) in importance {
                    match weight.as_f64() {
                        Some(w) => features.push(FeatureWeight::new(label, w)),
                        None => return malformed(format!("weight for '{label}' is not a number")),
                    }
                }
            }
            if let Some(text) = nested.get("explanation").and_then(Value::as_str) {
                if summary.is_none() {
                    summary = Some(text.to_string());
                }
                rationale.push(text.to_string());
            }
        }
        _ => return malformed("missing 'explanation'".to_string()),
    }

    if features.is_empty() && rationale.is_empty() {
        return malformed("'explanation' is empty".to_string());
    }

    let summary = summary.unwrap_or_else(|| {
        format!(
            "Match score of {:.3} based on {} weighted feature(s)",
            predicted_score / 100.0,
            features.len()
        )
    });

    StageOutcome::Ok(ExplanationResult {
        features,
        predicted_score,
        is_fallback: false,
        summary,
        rationale,
        fallback_reason: None,
    })
}

fn parse_pair(pair: &[Value]) -> Option<FeatureWeight> {
    match pair {
        [Value::String(label), weight] => weight.as_f64().map(|w| FeatureWeight::new(label, w)),
        _ => None,
    }
}
