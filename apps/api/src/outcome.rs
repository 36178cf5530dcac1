//! Stage outcomes shared by every enrichment stage of the pipeline.
//!
//! A stage either produces its value or a `FallbackReason`. Each component turns the
//! reason into its own well-formed fallback payload, so nothing above the component
//! ever sees an exception or an absent result.

use serde::{Deserialize, Serialize};

use crate::enrichment::EnrichmentError;

/// Result of one pipeline stage: the real value, or the reason a fallback was used.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Ok(T),
    Fallback(FallbackReason),
}

impl<T> StageOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, StageOutcome::Fallback(_))
    }

    /// Collapses the outcome into a value, building the fallback payload from the reason.
    pub fn unwrap_or_fallback(self, fallback: impl FnOnce(FallbackReason) -> T) -> T {
        match self {
            StageOutcome::Ok(value) => value,
            StageOutcome::Fallback(reason) => fallback(reason),
        }
    }
}

impl<T> From<EnrichmentError> for StageOutcome<T> {
    fn from(err: EnrichmentError) -> Self {
        StageOutcome::Fallback(FallbackReason::from(err))
    }
}

/// Why a stage fell back instead of producing real data.
///
/// Variants group into the four failure families the pipeline distinguishes:
/// insufficient sample, enrichment unavailable (timeout, status, transport, malformed),
/// malformed input, and the operator-level `disabled` switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Fewer than the minimum number of applications or groups.
    InsufficientData { applications: usize, groups: usize },
    /// Every group has a zero selection rate, so the ratio has no denominator.
    UndefinedRatio,
    Timeout { service: String },
    ServiceError { service: String, status: u16 },
    TransportError { service: String, detail: String },
    MalformedPayload { service: String, detail: String },
    /// Text was empty once tokenized.
    InsufficientText { field: String },
    Disabled { service: String },
}

impl FallbackReason {
    /// Machine-readable reason code persisted alongside fallback payloads.
    pub fn code(&self) -> &'static str {
        match self {
            FallbackReason::InsufficientData { .. } => "insufficient_data",
            FallbackReason::UndefinedRatio => "undefined_ratio",
            FallbackReason::Timeout { .. } => "timeout",
            FallbackReason::ServiceError { .. } => "service_error",
            FallbackReason::TransportError { .. } => "transport_error",
            FallbackReason::MalformedPayload { .. } => "malformed_payload",
            FallbackReason::InsufficientText { .. } => "insufficient_text",
            FallbackReason::Disabled { .. } => "disabled",
        }
    }

    /// True when the cause was the backend rather than the data.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            FallbackReason::Timeout { .. }
                | FallbackReason::ServiceError { .. }
                | FallbackReason::TransportError { .. }
                | FallbackReason::MalformedPayload { .. }
        )
    }

    pub fn message(&self) -> String {
        match self {
            FallbackReason::InsufficientData {
                applications,
                groups,
            } => format!(
                "insufficient data: {applications} scored application(s) across {groups} group(s), minimum 2 of each required"
            ),
            FallbackReason::UndefinedRatio => {
                "insufficient data: no group has a positive selection rate, disparate impact is undefined"
                    .to_string()
            }
            FallbackReason::Timeout { service } => {
                format!("{service} timed out - using fallback")
            }
            FallbackReason::ServiceError { service, status } => {
                format!("{service} returned status {status} - using fallback")
            }
            FallbackReason::TransportError { service, detail } => {
                format!("{service} unreachable: {detail} - using fallback")
            }
            FallbackReason::MalformedPayload { service, detail } => {
                format!("{service} returned malformed data: {detail} - using fallback")
            }
            FallbackReason::InsufficientText { field } => {
                format!("insufficient text: no usable content in {field}")
            }
            FallbackReason::Disabled { service } => {
                format!("{service} is disabled - using fallback")
            }
        }
    }
}

impl From<EnrichmentError> for FallbackReason {
    fn from(err: EnrichmentError) -> Self {
        match err {
            EnrichmentError::Timeout { service } => FallbackReason::Timeout { service },
            EnrichmentError::Status { service, status } => {
                FallbackReason::ServiceError { service, status }
            }
            EnrichmentError::Transport { service, detail } => {
                FallbackReason::TransportError { service, detail }
            }
            EnrichmentError::Malformed { service, detail } => {
                FallbackReason::MalformedPayload { service, detail }
            }
        }
    }
}
