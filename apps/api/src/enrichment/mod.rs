//! Enrichment client: the single HTTP entry point for the embed, audit and explain backends.
//!
//! Every backend call goes through `EnrichmentClient`, which classifies failures into
//! the four cases the pipeline distinguishes (timeout, non-2xx, transport, malformed).
//! Callers treat all four as "unavailable" and fall back locally.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnrichmentError {
    #[error("{service} timed out")]
    Timeout { service: String },

    #[error("{service} returned status {status}")]
    Status { service: String, status: u16 },

    #[error("{service} request failed: {detail}")]
    Transport { service: String, detail: String },

    #[error("{service} returned malformed payload: {detail}")]
    Malformed { service: String, detail: String },
}

/// Reported state of one backend, as seen from `/health/dependencies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendHealth {
    Healthy,
    Unavailable { reason: String },
    Disabled,
}

/// Thin JSON-over-HTTP client bound to one backend with its own timeout.
#[derive(Clone)]
pub struct EnrichmentClient {
    client: Client,
    base_url: String,
    service: String,
}

impl EnrichmentClient {
    pub fn new(service: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout.min(Duration::from_secs(5)))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            service: service.to_string(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// POSTs `body` to `path` and returns the decoded JSON document.
    ///
    /// The document is returned loosely typed; each caller normalizes it into its own
    /// strict shape immediately.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, EnrichmentError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        self.decode(response).await
    }

    /// GET `/health` on the backend.
    pub async fn health(&self) -> BackendHealth {
        let url = format!("{}/health", self.base_url);
        let result = match self.client.get(&url).send().await {
            Ok(response) => self.decode(response).await,
            Err(e) => Err(self.classify(e)),
        };

        match result {
            Ok(body) if body.get("status").and_then(Value::as_str) == Some("healthy") => {
                BackendHealth::Healthy
            }
            Ok(body) => BackendHealth::Unavailable {
                reason: format!(
                    "unexpected health status: {}",
                    body.get("status").cloned().unwrap_or(Value::Null)
                ),
            },
            Err(e) => BackendHealth::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    async fn decode(&self, response: reqwest::Response) -> Result<Value, EnrichmentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", self.service, status, body);
            return Err(EnrichmentError::Status {
                service: self.service.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&bytes).map_err(|e| EnrichmentError::Malformed {
            service: self.service.clone(),
            detail: e.to_string(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> EnrichmentError {
        if err.is_timeout() {
            warn!("{} request timed out", self.service);
            EnrichmentError::Timeout {
                service: self.service.clone(),
            }
        } else {
            warn!("{} request failed: {err}", self.service);
            EnrichmentError::Transport {
                service: self.service.clone(),
                detail: err.to_string(),
            }
        }
    }
}
