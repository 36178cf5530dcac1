//! In-memory `ApplicationStore` for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use super::{ApplicationStore, StoreError};
use crate::explanation::ExplanationResult;
use crate::fairness::FairnessReport;
use crate::matching::MatchCandidate;
use crate::models::application::{ApplicationRow, ApplicationStatus, ScoredApplication};
use crate::models::job::JobPostingRow;
use crate::models::resume::CandidateResumeRow;

#[derive(Default)]
pub struct InMemoryStore {
    jobs: Mutex<HashMap<Uuid, JobPostingRow>>,
    resumes: Mutex<HashMap<Uuid, CandidateResumeRow>>,
    applications: Mutex<HashMap<Uuid, ApplicationRow>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, title: &str, requirements: &str, embedding: Option<Vec<f32>>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.jobs.lock().unwrap().insert(
            id,
            JobPostingRow {
                id,
                title: title.to_string(),
                description: String::new(),
                requirements: requirements.to_string(),
                embedding,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn add_resume(
        &self,
        raw_text: &str,
        experience_years: Option<i32>,
        embedding: Option<Vec<f32>>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.resumes.lock().unwrap().insert(
            id,
            CandidateResumeRow {
                id,
                candidate_id: Uuid::new_v4(),
                raw_text: Some(raw_text.to_string()),
                skills: Vec::new(),
                education: Vec::new(),
                experience_years,
                embedding,
                is_active: true,
                uploaded_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn add_application(&self, job_id: Uuid, resume_id: Uuid, score: Option<f64>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.applications.lock().unwrap().insert(
            id,
            ApplicationRow {
                id,
                job_id,
                resume_id,
                score,
                fairness_report: None,
                explanation: None,
                status: ApplicationStatus::Pending,
                notes: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn set_resume_active(&self, id: Uuid, active: bool) {
        if let Some(r) = self.resumes.lock().unwrap().get_mut(&id) {
            r.is_active = active;
        }
    }

    pub fn application(&self, id: Uuid) -> ApplicationRow {
        self.applications.lock().unwrap()[&id].clone()
    }

    pub fn job(&self, id: Uuid) -> JobPostingRow {
        self.jobs.lock().unwrap()[&id].clone()
    }

    pub fn resume(&self, id: Uuid) -> CandidateResumeRow {
        self.resumes.lock().unwrap()[&id].clone()
    }

    /// Makes every subsequent write fail with a database error.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn update_application(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ApplicationRow),
    ) -> Result<(), StoreError> {
        self.check_write()?;
        let mut apps = self.applications.lock().unwrap();
        let row = apps.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "application",
            id,
        })?;
        f(row);
        row.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn fetch_application(&self, id: Uuid) -> Result<Option<ApplicationRow>, StoreError> {
        Ok(self.applications.lock().unwrap().get(&id).cloned())
    }

    async fn fetch_job(&self, id: Uuid) -> Result<Option<JobPostingRow>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn fetch_resume(&self, id: Uuid) -> Result<Option<CandidateResumeRow>, StoreError> {
        Ok(self.resumes.lock().unwrap().get(&id).cloned())
    }

    async fn set_job_embedding(&self, job_id: Uuid, embedding: &[f32]) -> Result<(), StoreError> {
        self.check_write()?;
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound {
            entity: "job",
            id: job_id,
        })?;
        job.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn set_resume_embedding(&self, resume_id: Uuid, embedding: &[f32]) -> Result<(), StoreError> {
        self.check_write()?;
        let mut resumes = self.resumes.lock().unwrap();
        let resume = resumes.get_mut(&resume_id).ok_or(StoreError::NotFound {
            entity: "resume",
            id: resume_id,
        })?;
        resume.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn set_score(&self, application_id: Uuid, score: f64) -> Result<(), StoreError> {
        self.update_application(application_id, |row| row.score = Some(score))
    }

    async fn set_fairness_report(
        &self,
        application_id: Uuid,
        report: &FairnessReport,
    ) -> Result<(), StoreError> {
        self.update_application(application_id, |row| {
            row.fairness_report = Some(Json(report.clone()))
        })
    }

    async fn set_explanation(
        &self,
        application_id: Uuid,
        explanation: &ExplanationResult,
    ) -> Result<(), StoreError> {
        self.update_application(application_id, |row| {
            row.explanation = Some(Json(explanation.clone()))
        })
    }

    async fn set_review(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update_application(application_id, |row| {
            row.status = status;
            if let Some(notes) = notes {
                row.notes = Some(notes.to_string());
            }
        })
    }

    async fn scored_pool(&self, job_id: Uuid) -> Result<Vec<ScoredApplication>, StoreError> {
        let apps = self.applications.lock().unwrap();
        let resumes = self.resumes.lock().unwrap();
        let mut pool: Vec<ScoredApplication> = apps
            .values()
            .filter(|a| a.job_id == job_id)
            .filter_map(|a| {
                Some(ScoredApplication {
                    application_id: a.id,
                    resume_id: a.resume_id,
                    score: a.score?,
                    experience_years: resumes.get(&a.resume_id).and_then(|r| r.experience_years),
                })
            })
            .collect();
        pool.sort_by_key(|a| a.application_id);
        Ok(pool)
    }

    async fn list_for_reprocess(&self, all: bool, limit: usize) -> Result<Vec<Uuid>, StoreError> {
        let apps = self.applications.lock().unwrap();
        let mut rows: Vec<&ApplicationRow> = apps
            .values()
            .filter(|a| all || a.score.is_none())
            .collect();
        rows.sort_by_key(|a| (a.created_at, a.id));
        Ok(rows.into_iter().take(limit).map(|a| a.id).collect())
    }

    async fn match_candidates(&self, job_id: Uuid) -> Result<Vec<MatchCandidate>, StoreError> {
        let apps = self.applications.lock().unwrap();
        let resumes = self.resumes.lock().unwrap();
        Ok(resumes
            .values()
            .filter(|r| r.is_active)
            .filter(|r| !apps.values().any(|a| a.job_id == job_id && a.resume_id == r.id))
            .filter_map(|r| {
                Some(MatchCandidate {
                    resume_id: r.id,
                    candidate_id: r.candidate_id,
                    embedding: r.embedding.clone()?,
                    skills: r.skills.clone(),
                    education: r.education.clone(),
                    experience_years: r.experience_years,
                })
            })
            .collect())
    }
}
