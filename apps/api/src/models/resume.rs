use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Résumé record as supplied by the upstream extractor. Skills and education keep
/// the extractor's order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateResumeRow {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub raw_text: Option<String>,
    pub skills: Vec<String>,
    pub education: Vec<String>,
    pub experience_years: Option<i32>,
    pub embedding: Option<Vec<f32>>,
    pub is_active: bool,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateResumeRow {
    /// Raw text when the extractor produced any, otherwise skills and education joined.
    pub fn text(&self) -> String {
        match self.raw_text.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.to_string(),
            _ => self
                .skills
                .iter()
                .chain(self.education.iter())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}
