//! Embedding provider: turns job and résumé text into fixed-dimension vectors.
//!
//! The provider is built once in `main` and shared read-only as `Arc<dyn Encoder>`.
//! The pipeline receives it by injection, so tests swap in a stub encoder.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::enrichment::{EnrichmentClient, EnrichmentError};

/// Output dimension of the sentence encoder behind the embed port.
pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyText,

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("batch returned {actual} embeddings for {expected} texts")]
    BatchSize { expected: usize, actual: usize },

    #[error(transparent)]
    Unavailable(#[from] EnrichmentError),
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    texts: &'a [String],
}

/// Encoder backed by the remote embed port (`/api/embed`, `/api/batch_embed`).
pub struct HttpEncoder {
    client: EnrichmentClient,
}

impl HttpEncoder {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: EnrichmentClient::new("matcher_service", base_url, timeout),
        }
    }

    pub fn client(&self) -> &EnrichmentClient {
        &self.client
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        let body = self
            .client
            .post_json("/api/embed", &EmbedRequest { text })
            .await?;
        let vector = parse_vector(self.client.service(), body.get("embedding"))?;
        debug!("Embedded text of {} chars", text.len());
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::EmptyText);
        }

        let body = self
            .client
            .post_json("/api/batch_embed", &BatchEmbedRequest { texts })
            .await?;

        let rows = body
            .get("embeddings")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(self.client.service(), "missing 'embeddings' array"))?;

        if rows.len() != texts.len() {
            return Err(EmbeddingError::BatchSize {
                expected: texts.len(),
                actual: rows.len(),
            });
        }

        rows.iter()
            .map(|row| parse_vector(self.client.service(), Some(row)))
            .collect()
    }
}

/// Normalizes one loosely-typed JSON vector into `Vec<f32>` of the expected dimension.
fn parse_vector(service: &str, value: Option<&Value>) -> Result<Vec<f32>, EmbeddingError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(service, "missing 'embedding' array"))?;

    let vector = items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32).filter(|f| f.is_finite()))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| malformed(service, "embedding contains non-numeric or out-of-range values"))?;

    if vector.len() != EMBEDDING_DIM {
        return Err(EmbeddingError::Dimension {
            expected: EMBEDDING_DIM,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

fn malformed(service: &str, detail: &str) -> EmbeddingError {
    EmbeddingError::Unavailable(EnrichmentError::Malformed {
        service: service.to_string(),
        detail: detail.to_string(),
    })
}
