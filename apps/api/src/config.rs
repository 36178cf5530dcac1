use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::fairness::FairnessThresholds;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or a number does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub embedding_service_url: String,
    pub embedding_timeout: Duration,
    /// Unset ⇒ the in-process auditor is used.
    pub fairness_service_url: Option<String>,
    pub fairness_enabled: bool,
    pub fairness_timeout: Duration,
    /// Unset ⇒ the in-process keyword explainer is used.
    pub explainability_service_url: Option<String>,
    pub explainability_enabled: bool,
    pub explainability_timeout: Duration,
    pub fairness_thresholds: FairnessThresholds,
    pub pipeline_concurrency: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = FairnessThresholds::default();

        let fairness_thresholds = FairnessThresholds {
            decision_threshold: parse_or(&lookup, "FAIRNESS_DECISION_THRESHOLD", defaults.decision_threshold)?,
            di_min: parse_or(&lookup, "FAIRNESS_DI_MIN", defaults.di_min)?,
            di_max: parse_or(&lookup, "FAIRNESS_DI_MAX", defaults.di_max)?,
            parity_max: parse_or(&lookup, "FAIRNESS_PARITY_MAX", defaults.parity_max)?,
            ..defaults
        };
        if fairness_thresholds.di_min > fairness_thresholds.di_max {
            anyhow::bail!("FAIRNESS_DI_MIN must not exceed FAIRNESS_DI_MAX");
        }

        Ok(Config {
            database_url: require(&lookup, "DATABASE_URL")?,
            embedding_service_url: require(&lookup, "EMBEDDING_SERVICE_URL")?,
            embedding_timeout: Duration::from_secs(parse_or(&lookup, "EMBEDDING_TIMEOUT_SECS", 120)?),
            fairness_service_url: optional(&lookup, "FAIRNESS_SERVICE_URL"),
            fairness_enabled: parse_or(&lookup, "FAIRNESS_SERVICE_ENABLED", true)?,
            fairness_timeout: Duration::from_secs(parse_or(&lookup, "FAIRNESS_TIMEOUT_SECS", 5)?),
            explainability_service_url: optional(&lookup, "EXPLAINABILITY_SERVICE_URL"),
            explainability_enabled: parse_or(&lookup, "EXPLAINABILITY_SERVICE_ENABLED", true)?,
            explainability_timeout: Duration::from_secs(parse_or(
                &lookup,
                "EXPLAINABILITY_TIMEOUT_SECS",
                5,
            )?),
            fairness_thresholds,
            pipeline_concurrency: parse_or(&lookup, "PIPELINE_CONCURRENCY", 4)?,
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
