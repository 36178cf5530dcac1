use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{ApplicationStore, StoreError};
use crate::explanation::ExplanationResult;
use crate::fairness::FairnessReport;
use crate::matching::MatchCandidate;
use crate::models::application::{ApplicationRow, ApplicationStatus, ScoredApplication};
use crate::models::job::JobPostingRow;
use crate::models::resume::CandidateResumeRow;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn expect_row(
    result: PgQueryResult,
    entity: &'static str,
    id: Uuid,
) -> Result<(), StoreError> {
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound { entity, id });
    }
    Ok(())
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn fetch_application(&self, id: Uuid) -> Result<Option<ApplicationRow>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, job_id, resume_id, score, fairness_report, explanation,
                   status, notes, created_at, updated_at
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn fetch_job(&self, id: Uuid) -> Result<Option<JobPostingRow>, StoreError> {
        let row = sqlx::query_as::<_, JobPostingRow>(
            r#"
            SELECT id, title, description, requirements, embedding, is_active,
                   created_at, updated_at
            FROM job_postings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn fetch_resume(&self, id: Uuid) -> Result<Option<CandidateResumeRow>, StoreError> {
        let row = sqlx::query_as::<_, CandidateResumeRow>(
            r#"
            SELECT id, candidate_id, raw_text, skills, education, experience_years,
                   embedding, is_active, uploaded_at, updated_at
            FROM candidate_resumes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_job_embedding(&self, job_id: Uuid, embedding: &[f32]) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE job_postings SET embedding = $1, updated_at = now() WHERE id = $2",
        )
        .bind(embedding)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        debug!("Stored embedding for job {job_id}");
        expect_row(result, "job", job_id)
    }

    async fn set_resume_embedding(&self, resume_id: Uuid, embedding: &[f32]) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE candidate_resumes SET embedding = $1, updated_at = now() WHERE id = $2",
        )
        .bind(embedding)
        .bind(resume_id)
        .execute(&self.pool)
        .await?;
        debug!("Stored embedding for resume {resume_id}");
        expect_row(result, "resume", resume_id)
    }

    async fn set_score(&self, application_id: Uuid, score: f64) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE applications SET score = $1, updated_at = now() WHERE id = $2")
                .bind(score)
                .bind(application_id)
                .execute(&self.pool)
                .await?;
        expect_row(result, "application", application_id)
    }

    async fn set_fairness_report(
        &self,
        application_id: Uuid,
        report: &FairnessReport,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE applications SET fairness_report = $1, updated_at = now() WHERE id = $2",
        )
        .bind(Json(report))
        .bind(application_id)
        .execute(&self.pool)
        .await?;
        expect_row(result, "application", application_id)
    }

    async fn set_explanation(
        &self,
        application_id: Uuid,
        explanation: &ExplanationResult,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE applications SET explanation = $1, updated_at = now() WHERE id = $2",
        )
        .bind(Json(explanation))
        .bind(application_id)
        .execute(&self.pool)
        .await?;
        expect_row(result, "application", application_id)
    }

    async fn set_review(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = $1, notes = COALESCE($2, notes), updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(application_id)
        .execute(&self.pool)
        .await?;
        expect_row(result, "application", application_id)
    }

    async fn scored_pool(&self, job_id: Uuid) -> Result<Vec<ScoredApplication>, StoreError> {
        let rows = sqlx::query_as::<_, ScoredApplication>(
            r#"
            SELECT a.id AS application_id, a.resume_id, a.score, r.experience_years
            FROM applications a
            JOIN candidate_resumes r ON r.id = a.resume_id
            WHERE a.job_id = $1 AND a.score IS NOT NULL
            ORDER BY a.id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_for_reprocess(&self, all: bool, limit: usize) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM applications
            WHERE $1 OR score IS NULL
            ORDER BY created_at, id
            LIMIT $2
            "#,
        )
        .bind(all)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn match_candidates(&self, job_id: Uuid) -> Result<Vec<MatchCandidate>, StoreError> {
        let rows = sqlx::query_as::<_, MatchCandidate>(
            r#"
            SELECT r.id AS resume_id, r.candidate_id, r.embedding, r.skills, r.education,
                   r.experience_years
            FROM candidate_resumes r
            WHERE r.is_active
              AND r.embedding IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM applications a
                  WHERE a.job_id = $1 AND a.resume_id = r.id
              )
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
