//! Remote audit backend. The service answers with loosely-typed JSON (`{metrics: {...}}`
//! or `{message: "insufficient data"}`); this module normalizes it into a strict
//! `FairnessReport` on receipt.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuditRequest, FairnessBackend, FairnessReport, FairnessThresholds, GroupStats};
use crate::enrichment::EnrichmentClient;
use crate::outcome::{FallbackReason, StageOutcome};

const DEFAULT_ATTRIBUTE: &str = "experience_level";

#[derive(Debug, Serialize)]
struct AuditPayload {
    job_id: Uuid,
    application_id: Uuid,
    score: f64,
    total_applications: usize,
}

pub struct RemoteFairness {
    client: EnrichmentClient,
    thresholds: FairnessThresholds,
}

impl RemoteFairness {
    pub fn new(base_url: &str, timeout: Duration, thresholds: FairnessThresholds) -> Self {
        Self {
            client: EnrichmentClient::new("fairness_service", base_url, timeout),
            thresholds,
        }
    }

    pub fn client(&self) -> &EnrichmentClient {
        &self.client
    }
}

#[async_trait]
impl FairnessBackend for RemoteFairness {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn protected_attribute(&self) -> &str {
        DEFAULT_ATTRIBUTE
    }

    fn decision_threshold(&self) -> f64 {
        self.thresholds.decision_threshold
    }

    async fn audit(&self, request: &AuditRequest<'_>) -> StageOutcome<FairnessReport> {
        let payload = AuditPayload {
            job_id: request.job_id,
            application_id: request.application_id,
            score: request.score,
            total_applications: request.pool.len(),
        };

        match self.client.post_json("/api/audit", &payload).await {
            Ok(body) => {
                let outcome = normalize_audit_payload(
                    self.client.service(),
                    &body,
                    &self.thresholds,
                    request.pool.len(),
                );
                if !outcome.is_fallback() {
                    info!("Remote fairness audit completed for job {}", request.job_id);
                }
                outcome
            }
            Err(e) => e.into(),
        }
    }
}

/// Normalizes a raw audit response into a report, or the reason it cannot be one.
pub fn normalize_audit_payload(
    service: &str,
    body: &Value,
    thresholds: &FairnessThresholds,
    pool_size: usize,
) -> StageOutcome<FairnessReport> {
    let malformed = |detail: &str| {
        StageOutcome::Fallback(FallbackReason::MalformedPayload {
            service: service.to_string(),
            detail: detail.to_string(),
        })
    };

    let Some(root) = body.as_object() else {
        return malformed("expected a JSON object");
    };

    if let Some(error) = root.get("error") {
        return malformed(&format!("service reported error: {error}"));
    }

    let metrics = match root.get("metrics") {
        Some(Value::Object(m)) => m,
        Some(Value::Null) | None => {
            return match root.get("message").and_then(Value::as_str) {
                Some(msg) if is_insufficient(msg) => insufficient(pool_size),
                _ => malformed("missing 'metrics' object"),
            };
        }
        Some(_) => return malformed("'metrics' is not an object"),
    };

    let total_applications = match metrics.get("total_applications") {
        Some(v) => match v.as_u64() {
            Some(n) => n as usize,
            None => return malformed("'total_applications' is not a count"),
        },
        None => pool_size,
    };

    let disparate_impact_ratio = match optional_f64(metrics, "disparate_impact_ratio") {
        Ok(v) => v,
        Err(detail) => return malformed(&detail),
    };
    let demographic_parity_difference = match optional_f64(metrics, "demographic_parity_difference") {
        Ok(v) => v,
        Err(detail) => return malformed(&detail),
    };

    if disparate_impact_ratio.is_none() && demographic_parity_difference.is_none() {
        return match metrics.get("message").and_then(Value::as_str) {
            Some(msg) if is_insufficient(msg) => insufficient(total_applications),
            _ => StageOutcome::Fallback(FallbackReason::UndefinedRatio),
        };
    }

    let reported_fair = match metrics.get("is_fair") {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Null) | None => None,
        Some(_) => return malformed("'is_fair' is not a boolean"),
    };
    // The service's verdict can only make the result stricter than our own band.
    let is_fair = reported_fair.unwrap_or(true)
        && thresholds.is_fair(disparate_impact_ratio, demographic_parity_difference);

    let protected_attribute = metrics
        .get("protected_attribute")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ATTRIBUTE)
        .to_string();

    StageOutcome::Ok(FairnessReport {
        groups: parse_groups(metrics.get("groups")),
        disparate_impact_ratio,
        demographic_parity_difference,
        is_fair,
        is_fallback: false,
        message: format!("Fairness audit completed over {total_applications} application(s)"),
        fallback_reason: None,
        total_applications,
        protected_attribute,
        decision_threshold: thresholds.decision_threshold,
        suggested_actions: Vec::new(),
    })
}

fn is_insufficient(message: &str) -> bool {
    message.to_ascii_lowercase().contains("insufficient")
}

fn insufficient(applications: usize) -> StageOutcome<FairnessReport> {
    StageOutcome::Fallback(FallbackReason::InsufficientData {
        applications,
        groups: 0,
    })
}

fn optional_f64(map: &Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| format!("'{key}' is not a number")),
    }
}

/// Group entries that are not `{count, selection_rate}` are dropped with a warning.
fn parse_groups(value: Option<&Value>) -> BTreeMap<String, GroupStats> {
    let Some(Value::Object(groups)) = value else {
        return BTreeMap::new();
    };

    groups
        .iter()
        .filter_map(|(label, entry)| {
            let count = entry.get("count").and_then(Value::as_u64);
            let rate = entry.get("selection_rate").and_then(Value::as_f64);
            match (count, rate) {
                (Some(count), Some(selection_rate)) => Some((
                    label.clone(),
                    GroupStats {
                        count: count as usize,
                        selection_rate,
                    },
                )),
                _ => {
                    warn!("Dropping malformed fairness group entry '{label}'");
                    None
                }
            }
        })
        .collect()
}
