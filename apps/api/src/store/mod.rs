//! Persistence boundary. The pipeline and handlers only see `ApplicationStore`;
//! `PgStore` is the production implementation.
//!
//! Every write touches exactly one result field of one row, so concurrent runs over
//! the same application resolve as last-write-wins per field.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::explanation::ExplanationResult;
use crate::fairness::FairnessReport;
use crate::matching::MatchCandidate;
use crate::models::application::{ApplicationRow, ApplicationStatus, ScoredApplication};
use crate::models::job::JobPostingRow;
use crate::models::resume::CandidateResumeRow;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn fetch_application(&self, id: Uuid) -> Result<Option<ApplicationRow>, StoreError>;
    async fn fetch_job(&self, id: Uuid) -> Result<Option<JobPostingRow>, StoreError>;
    async fn fetch_resume(&self, id: Uuid) -> Result<Option<CandidateResumeRow>, StoreError>;

    async fn set_job_embedding(&self, job_id: Uuid, embedding: &[f32]) -> Result<(), StoreError>;
    async fn set_resume_embedding(&self, resume_id: Uuid, embedding: &[f32]) -> Result<(), StoreError>;

    async fn set_score(&self, application_id: Uuid, score: f64) -> Result<(), StoreError>;
    async fn set_fairness_report(
        &self,
        application_id: Uuid,
        report: &FairnessReport,
    ) -> Result<(), StoreError>;
    async fn set_explanation(
        &self,
        application_id: Uuid,
        explanation: &ExplanationResult,
    ) -> Result<(), StoreError>;

    /// Reviewer update. `notes = None` leaves existing notes untouched.
    async fn set_review(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Every application of the job that currently has a score.
    async fn scored_pool(&self, job_id: Uuid) -> Result<Vec<ScoredApplication>, StoreError>;

    /// Application ids to re-run, oldest first. Without `all`, only score-less ones.
    async fn list_for_reprocess(&self, all: bool, limit: usize) -> Result<Vec<Uuid>, StoreError>;

    /// Active résumés with an embedding that have not applied to the job.
    async fn match_candidates(&self, job_id: Uuid) -> Result<Vec<MatchCandidate>, StoreError>;
}
