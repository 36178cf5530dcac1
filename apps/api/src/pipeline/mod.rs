//! Pipeline Orchestrator: runs score → fairness → explanation for one application.
//!
//! Each stage persists its own field as soon as it finishes. A stage that cannot run
//! produces its component's fallback payload and the run carries on; only store
//! failures and missing records end a run early.

pub mod handlers;
pub mod reprocess;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embedding::{EmbeddingError, Encoder};
use crate::explanation::{self, ExplainRequest, ExplanationBackend, ExplanationResult};
use crate::fairness::{AuditRequest, FairnessBackend, FairnessReport};
use crate::matching::{match_embeddings, MatchOutcome};
use crate::models::job::JobPostingRow;
use crate::models::resume::CandidateResumeRow;
use crate::outcome::{FallbackReason, StageOutcome};
use crate::store::{ApplicationStore, StoreError};

const FAIRNESS_SERVICE: &str = "fairness_service";
const EXPLAINABILITY_SERVICE: &str = "explainability_service";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ────────────────────────────────────────────────────────────────────────────
// Run summary
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Fallback { code: String },
    Skipped { reason: String },
}

impl StageStatus {
    fn fallback(reason: &FallbackReason) -> Self {
        StageStatus::Fallback {
            code: reason.code().to_string(),
        }
    }

    fn skipped(reason: &str) -> Self {
        StageStatus::Skipped {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub score: StageStatus,
    pub fairness: StageStatus,
    pub explanation: StageStatus,
}

/// What one orchestration run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub application_id: Uuid,
    /// Score after the run: freshly computed, or the prior value when scoring was skipped.
    pub score: Option<f64>,
    pub stages: StageReport,
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fairness_enabled: bool,
    pub explanation_enabled: bool,
    /// Upper bound on one fairness audit, whichever backend runs it.
    pub fairness_timeout: Duration,
    pub explanation_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fairness_enabled: true,
            explanation_enabled: true,
            fairness_timeout: Duration::from_secs(5),
            explanation_timeout: Duration::from_secs(5),
        }
    }
}

/// Cheap to clone; every collaborator is shared behind an `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ApplicationStore>,
    encoder: Arc<dyn Encoder>,
    fairness: Arc<dyn FairnessBackend>,
    explainer: Arc<dyn ExplanationBackend>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        encoder: Arc<dyn Encoder>,
        fairness: Arc<dyn FairnessBackend>,
        explainer: Arc<dyn ExplanationBackend>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            encoder,
            fairness,
            explainer,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ApplicationStore> {
        &self.store
    }

    /// Runs every stage once for `application_id`. Safe to repeat: each stage overwrites
    /// its own field.
    pub async fn process(&self, application_id: Uuid) -> Result<PipelineRun, PipelineError> {
        let application = self
            .store
            .fetch_application(application_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "application",
                id: application_id,
            })?;
        let mut job = self
            .store
            .fetch_job(application.job_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "job",
                id: application.job_id,
            })?;
        let mut resume = self
            .store
            .fetch_resume(application.resume_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "resume",
                id: application.resume_id,
            })?;

        self.resolve_embeddings(&mut job, &mut resume).await?;

        // Stage 1: score
        let (score, score_status) =
            match match_embeddings(job.embedding.as_deref(), resume.embedding.as_deref()) {
                MatchOutcome::Score(score) => {
                    self.store.set_score(application_id, score).await?;
                    info!("Updated application {application_id} with score {score:.2}");
                    (Some(score), StageStatus::Completed)
                }
                MatchOutcome::MissingEmbedding => {
                    warn!("Could not calculate score for application {application_id}: missing embedding");
                    (application.score, StageStatus::skipped("missing_embedding"))
                }
            };

        // Stage 2: fairness
        let fairness_status = self
            .run_fairness(application_id, application.job_id, score)
            .await?;

        // Stage 3: explanation
        let predicted = explanation::predicted_score(
            score,
            job.embedding.as_deref(),
            resume.embedding.as_deref(),
        );
        let explanation_status = self
            .run_explanation(application_id, &job, &resume, predicted)
            .await?;

        Ok(PipelineRun {
            application_id,
            score,
            stages: StageReport {
                score: score_status,
                fairness: fairness_status,
                explanation: explanation_status,
            },
        })
    }

    /// Fills in absent embeddings through the encoder and persists them. Encoder
    /// failures only leave the embedding absent.
    async fn resolve_embeddings(
        &self,
        job: &mut JobPostingRow,
        resume: &mut CandidateResumeRow,
    ) -> Result<(), PipelineError> {
        let need_job = job.embedding.as_ref().map_or(true, |e| e.is_empty());
        let need_resume = resume.embedding.as_ref().map_or(true, |e| e.is_empty());

        let (job_vec, resume_vec) = match (need_job, need_resume) {
            (false, false) => return Ok(()),
            (true, true) => {
                match self.encoder.embed_batch(&[job.text(), resume.text()]).await {
                    Ok(mut vectors) if vectors.len() == 2 => {
                        let resume_vec = vectors.pop();
                        (vectors.pop(), resume_vec)
                    }
                    Ok(vectors) => {
                        warn!(
                            "Could not embed job and resume text: expected 2 vectors, got {}",
                            vectors.len()
                        );
                        (None, None)
                    }
                    Err(e) => {
                        log_embedding_failure("job and resume", &e);
                        (None, None)
                    }
                }
            }
            (true, false) => (self.embed_one("job", &job.text()).await, None),
            (false, true) => (None, self.embed_one("resume", &resume.text()).await),
        };

        if let Some(vector) = job_vec {
            self.store.set_job_embedding(job.id, &vector).await?;
            job.embedding = Some(vector);
        }
        if let Some(vector) = resume_vec {
            self.store.set_resume_embedding(resume.id, &vector).await?;
            resume.embedding = Some(vector);
        }
        Ok(())
    }

    async fn embed_one(&self, what: &str, text: &str) -> Option<Vec<f32>> {
        match self.encoder.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                log_embedding_failure(what, &e);
                None
            }
        }
    }

    async fn run_fairness(
        &self,
        application_id: Uuid,
        job_id: Uuid,
        score: Option<f64>,
    ) -> Result<StageStatus, PipelineError> {
        let attribute = self.fairness.protected_attribute().to_string();
        let threshold = self.fairness.decision_threshold();

        if !self.settings.fairness_enabled {
            let reason = FallbackReason::Disabled {
                service: FAIRNESS_SERVICE.to_string(),
            };
            let report = FairnessReport::fallback(&reason, 0, &attribute, threshold);
            self.store.set_fairness_report(application_id, &report).await?;
            info!("Fairness service is disabled, stored fallback for application {application_id}");
            return Ok(StageStatus::fallback(&reason));
        }

        let Some(score) = score else {
            info!("Skipping fairness for application {application_id}: no score yet");
            return Ok(StageStatus::skipped("missing_score"));
        };

        let pool = self.store.scored_pool(job_id).await?;
        let request = AuditRequest {
            job_id,
            application_id,
            score,
            pool: &pool,
        };
        let outcome = bounded(
            self.settings.fairness_timeout,
            FAIRNESS_SERVICE,
            self.fairness.audit(&request),
        )
        .await;

        let status = match &outcome {
            StageOutcome::Ok(_) => StageStatus::Completed,
            StageOutcome::Fallback(reason) => {
                warn!(
                    "Fairness fallback for application {application_id}: {}",
                    reason.message()
                );
                StageStatus::fallback(reason)
            }
        };
        let report = FairnessReport::from_outcome(outcome, pool.len(), &attribute, threshold);
        self.store.set_fairness_report(application_id, &report).await?;
        info!("Updated application {application_id} with fairness metrics");
        Ok(status)
    }

    async fn run_explanation(
        &self,
        application_id: Uuid,
        job: &JobPostingRow,
        resume: &CandidateResumeRow,
        predicted_score: f64,
    ) -> Result<StageStatus, PipelineError> {
        let outcome = if self.settings.explanation_enabled {
            let job_text = job.text();
            let resume_text = resume.text();
            let request = ExplainRequest {
                job_id: job.id,
                resume_id: resume.id,
                job_text: &job_text,
                resume_text: &resume_text,
                predicted_score,
            };
            bounded(
                self.settings.explanation_timeout,
                EXPLAINABILITY_SERVICE,
                self.explainer.explain(&request),
            )
            .await
        } else {
            StageOutcome::Fallback(FallbackReason::Disabled {
                service: EXPLAINABILITY_SERVICE.to_string(),
            })
        };

        let status = match &outcome {
            StageOutcome::Ok(_) => StageStatus::Completed,
            StageOutcome::Fallback(reason) => {
                warn!(
                    "Explanation fallback for application {application_id}: {}",
                    reason.message()
                );
                StageStatus::fallback(reason)
            }
        };
        let result = ExplanationResult::from_outcome(outcome, predicted_score);
        self.store.set_explanation(application_id, &result).await?;
        info!("Updated application {application_id} with explanation");
        Ok(status)
    }
}

/// Caps a stage at `limit`; an overrun becomes a timeout fallback.
async fn bounded<T>(
    limit: Duration,
    service: &str,
    stage: impl Future<Output = StageOutcome<T>>,
) -> StageOutcome<T> {
    match tokio::time::timeout(limit, stage).await {
        Ok(outcome) => outcome,
        Err(_) => StageOutcome::Fallback(FallbackReason::Timeout {
            service: service.to_string(),
        }),
    }
}

fn log_embedding_failure(what: &str, err: &EmbeddingError) {
    warn!("Could not embed {what} text: {err}");
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::test_support::StubEncoder;
    use super::*;
    use crate::explanation::LocalExplainer;
    use crate::fairness::{FairnessAuditor, LocalFairness};
    use crate::store::memory::InMemoryStore;

    struct DownFairness;

    #[async_trait]
    impl FairnessBackend for DownFairness {
        fn name(&self) -> &'static str {
            "down"
        }

        fn protected_attribute(&self) -> &str {
            "experience_level"
        }

        fn decision_threshold(&self) -> f64 {
            0.5
        }

        async fn audit(&self, _request: &AuditRequest<'_>) -> StageOutcome<FairnessReport> {
            StageOutcome::Fallback(FallbackReason::ServiceError {
                service: FAIRNESS_SERVICE.to_string(),
                status: 500,
            })
        }
    }

    struct SlowExplainer;

    #[async_trait]
    impl ExplanationBackend for SlowExplainer {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn explain(&self, _request: &ExplainRequest<'_>) -> StageOutcome<ExplanationResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            StageOutcome::Fallback(FallbackReason::UndefinedRatio)
        }
    }

    fn pipeline_with(
        store: Arc<InMemoryStore>,
        encoder: Arc<StubEncoder>,
        fairness: Arc<dyn FairnessBackend>,
        explainer: Arc<dyn ExplanationBackend>,
        settings: PipelineSettings,
    ) -> Pipeline {
        Pipeline::new(store, encoder, fairness, explainer, settings)
    }

    fn local_pipeline(store: Arc<InMemoryStore>, encoder: Arc<StubEncoder>) -> Pipeline {
        pipeline_with(
            store,
            encoder,
            Arc::new(LocalFairness::new(FairnessAuditor::default())),
            Arc::new(LocalExplainer),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_scores_and_explains() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Backend Engineer", "python docker", Some(vec![0.6, 0.8]));
        let resume = store.add_resume("Seasoned python developer", Some(6), Some(vec![0.6, 0.8]));
        let app = store.add_application(job, resume, None);

        let pipeline = local_pipeline(store.clone(), Arc::new(StubEncoder::failing()));
        let run = pipeline.process(app).await.unwrap();

        let score = run.score.unwrap();
        assert!((score - 100.0).abs() < 1e-9);
        assert_eq!(run.stages.score, StageStatus::Completed);

        let row = store.application(app);
        assert_eq!(row.score, Some(score));

        let explanation = row.explanation.unwrap().0;
        assert!(!explanation.is_fallback);
        let weight = |label: &str| {
            explanation
                .features
                .iter()
                .find(|f| f.label == label)
                .map(|f| f.weight)
        };
        assert_eq!(weight("python"), Some(0.1));
        assert_eq!(weight("docker"), Some(-0.05));

        // a single scored application is too small a pool
        let report = row.fairness_report.unwrap().0;
        assert!(report.is_fallback);
        assert_eq!(report.fallback_reason.as_deref(), Some("insufficient_data"));
        assert_eq!(
            run.stages.fairness,
            StageStatus::Fallback {
                code: "insufficient_data".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Data Engineer", "sql aws", Some(vec![0.3, 0.1, 0.9]));
        let r1 = store.add_resume("sql", Some(1), Some(vec![0.2, 0.4, 0.7]));
        let r2 = store.add_resume("aws", Some(7), Some(vec![0.9, 0.1, 0.1]));
        let a1 = store.add_application(job, r1, None);
        store.add_application(job, r2, Some(40.0));

        let pipeline = local_pipeline(store.clone(), Arc::new(StubEncoder::failing()));
        let first = pipeline.process(a1).await.unwrap();
        let first_row = store.application(a1);
        let second = pipeline.process(a1).await.unwrap();
        let second_row = store.application(a1);

        assert_eq!(
            first.score.map(f64::to_bits),
            second.score.map(f64::to_bits)
        );
        assert_eq!(first.stages, second.stages);
        assert_eq!(first_row.fairness_report, second_row.fairness_report);
        assert_eq!(first_row.explanation, second_row.explanation);
    }

    #[tokio::test]
    async fn test_missing_embeddings_are_resolved_and_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", None);
        let resume = store.add_resume("python", Some(3), None);
        let app = store.add_application(job, resume, None);

        let encoder = Arc::new(StubEncoder::returning(vec![1.0, 0.0]));
        let pipeline = local_pipeline(store.clone(), encoder.clone());
        let run = pipeline.process(app).await.unwrap();

        assert_eq!(encoder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.job(job).embedding, Some(vec![1.0, 0.0]));
        assert_eq!(store.resume(resume).embedding, Some(vec![1.0, 0.0]));
        assert_eq!(run.score, Some(100.0));
    }

    /// Answers every batch with a single vector, whatever the input size.
    struct ShortBatchEncoder;

    #[async_trait]
    impl Encoder for ShortBatchEncoder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    #[tokio::test]
    async fn test_short_batch_leaves_embeddings_absent() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", None);
        let resume = store.add_resume("python", Some(3), None);
        let app = store.add_application(job, resume, None);

        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(ShortBatchEncoder),
            Arc::new(LocalFairness::new(FairnessAuditor::default())),
            Arc::new(LocalExplainer),
            PipelineSettings::default(),
        );
        let run = pipeline.process(app).await.unwrap();

        assert_eq!(run.stages.score, StageStatus::skipped("missing_embedding"));
        assert!(store.job(job).embedding.is_none());
        assert!(store.resume(resume).embedding.is_none());
    }

    #[tokio::test]
    async fn test_encoder_failure_skips_score_and_fairness_only() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python docker", None);
        let resume = store.add_resume("python", Some(3), None);
        let app = store.add_application(job, resume, None);

        let pipeline = local_pipeline(store.clone(), Arc::new(StubEncoder::failing()));
        let run = pipeline.process(app).await.unwrap();

        assert_eq!(run.score, None);
        assert_eq!(run.stages.score, StageStatus::skipped("missing_embedding"));
        assert_eq!(run.stages.fairness, StageStatus::skipped("missing_score"));
        assert_eq!(run.stages.explanation, StageStatus::Completed);

        let row = store.application(app);
        assert!(row.score.is_none());
        assert!(row.fairness_report.is_none());
        let explanation = row.explanation.unwrap().0;
        assert_eq!(explanation.predicted_score, 0.0);
    }

    #[tokio::test]
    async fn test_missing_embedding_keeps_prior_score() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", None);
        let resume = store.add_resume("python", Some(3), None);
        let app = store.add_application(job, resume, Some(72.0));

        let pipeline = local_pipeline(store.clone(), Arc::new(StubEncoder::failing()));
        let run = pipeline.process(app).await.unwrap();

        assert_eq!(run.score, Some(72.0));
        assert_eq!(store.application(app).score, Some(72.0));
        // the prior score is enough to attempt fairness
        assert!(!matches!(run.stages.fairness, StageStatus::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_backend_failures_do_not_abort_later_stages() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![1.0, 0.0]));
        let resume = store.add_resume("python", Some(1), Some(vec![1.0, 1.0]));
        let app = store.add_application(job, resume, None);

        let pipeline = pipeline_with(
            store.clone(),
            Arc::new(StubEncoder::failing()),
            Arc::new(DownFairness),
            Arc::new(SlowExplainer),
            PipelineSettings {
                explanation_timeout: Duration::from_millis(50),
                ..PipelineSettings::default()
            },
        );
        let run = pipeline.process(app).await.unwrap();

        assert_eq!(
            run.stages.fairness,
            StageStatus::Fallback {
                code: "service_error".to_string()
            }
        );
        assert_eq!(
            run.stages.explanation,
            StageStatus::Fallback {
                code: "timeout".to_string()
            }
        );

        let row = store.application(app);
        let report = row.fairness_report.unwrap().0;
        assert!(report.is_fallback);
        assert!(report.message.contains("500"));
        let explanation = row.explanation.unwrap().0;
        assert!(explanation.is_fallback);
        assert!(!explanation.features.is_empty());
        assert!((row.score.unwrap() - 100.0 / 2.0_f64.sqrt()).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_disabled_stages_store_disabled_fallbacks() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![1.0, 0.0]));
        let resume = store.add_resume("python", Some(1), Some(vec![1.0, 0.0]));
        let app = store.add_application(job, resume, None);

        let pipeline = pipeline_with(
            store.clone(),
            Arc::new(StubEncoder::failing()),
            Arc::new(LocalFairness::new(FairnessAuditor::default())),
            Arc::new(LocalExplainer),
            PipelineSettings {
                fairness_enabled: false,
                explanation_enabled: false,
                ..PipelineSettings::default()
            },
        );
        let run = pipeline.process(app).await.unwrap();
        let disabled = StageStatus::Fallback {
            code: "disabled".to_string(),
        };
        assert_eq!(run.stages.fairness, disabled);
        assert_eq!(run.stages.explanation, disabled);

        let row = store.application(app);
        assert_eq!(
            row.fairness_report.unwrap().0.fallback_reason.as_deref(),
            Some("disabled")
        );
        assert_eq!(
            row.explanation.unwrap().0.fallback_reason.as_deref(),
            Some("disabled")
        );
    }

    #[tokio::test]
    async fn test_fairness_audits_the_whole_job_pool() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![1.0, 0.0]));
        let junior = store.add_resume("python", Some(0), Some(vec![1.0, 0.0]));
        let senior = store.add_resume("python", Some(9), None);
        let app = store.add_application(job, junior, None);
        store.add_application(job, senior, Some(10.0));

        let pipeline = local_pipeline(store.clone(), Arc::new(StubEncoder::failing()));
        let run = pipeline.process(app).await.unwrap();
        assert_eq!(run.stages.fairness, StageStatus::Completed);

        let report = store.application(app).fairness_report.unwrap().0;
        assert_eq!(report.total_applications, 2);
        assert_eq!(report.disparate_impact_ratio, Some(0.0));
        assert!(!report.is_fair);
    }

    #[tokio::test]
    async fn test_store_failure_bubbles_up() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![1.0, 0.0]));
        let resume = store.add_resume("python", Some(1), Some(vec![1.0, 0.0]));
        let app = store.add_application(job, resume, None);
        store.fail_writes();

        let pipeline = local_pipeline(store.clone(), Arc::new(StubEncoder::failing()));
        let err = pipeline.process(app).await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_unknown_application_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = local_pipeline(store, Arc::new(StubEncoder::failing()));
        let err = pipeline.process(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "application", .. }));
    }
}
