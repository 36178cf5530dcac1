//! Batch reprocessing: re-runs the pipeline over many applications with bounded
//! concurrency. Used by the `reprocess` subcommand and the reprocess endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use super::{Pipeline, PipelineError};

pub const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReprocessSelection {
    /// Re-run every application, not only those without a score.
    #[serde(default)]
    pub all: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for ReprocessSelection {
    fn default() -> Self {
        Self {
            all: false,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReprocessItem {
    pub application_id: Uuid,
    pub ok: bool,
    pub score: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprocessSummary {
    pub processed: usize,
    pub total: usize,
    pub items: Vec<ReprocessItem>,
}

/// Runs the pipeline over the selected applications, at most `concurrency` at once.
/// A failed application is recorded and the batch continues.
pub async fn reprocess(
    pipeline: &Pipeline,
    selection: ReprocessSelection,
    concurrency: usize,
) -> Result<ReprocessSummary, PipelineError> {
    let ids = pipeline
        .store()
        .list_for_reprocess(selection.all, selection.limit)
        .await?;
    let total = ids.len();
    info!("Reprocessing {total} application(s) with concurrency {concurrency}");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();
    let mut task_ids = HashMap::with_capacity(total);
    for id in ids {
        let pipeline = pipeline.clone();
        let sem = semaphore.clone();
        let handle = set.spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return (id, Err("worker pool closed".to_string()));
            };
            let result = pipeline
                .process(id)
                .await
                .map(|run| run.score)
                .map_err(|e| e.to_string());
            (id, result)
        });
        task_ids.insert(handle.id(), id);
    }

    let mut items = Vec::with_capacity(total);
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((_, (application_id, Ok(score)))) => items.push(ReprocessItem {
                application_id,
                ok: true,
                score,
                error: None,
            }),
            Ok((_, (application_id, Err(e)))) => {
                error!("Error processing application {application_id}: {e}");
                items.push(ReprocessItem {
                    application_id,
                    ok: false,
                    score: None,
                    error: Some(e),
                });
            }
            Err(e) => {
                let Some(application_id) = task_ids.get(&e.id()).copied() else {
                    error!("Reprocess worker for an unknown task failed: {e}");
                    continue;
                };
                error!("Reprocess worker for application {application_id} failed: {e}");
                items.push(ReprocessItem {
                    application_id,
                    ok: false,
                    score: None,
                    error: Some(format!("worker failed: {e}")),
                });
            }
        }
    }
    items.sort_by_key(|item| item.application_id);

    let processed = items.iter().filter(|item| item.ok).count();
    info!("Successfully processed {processed}/{total} applications");

    Ok(ReprocessSummary {
        processed,
        total,
        items,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::explanation::{ExplainRequest, ExplanationBackend, ExplanationResult, LocalExplainer};
    use crate::fairness::{FairnessAuditor, LocalFairness};
    use crate::pipeline::test_support::StubEncoder;
    use crate::pipeline::PipelineSettings;
    use crate::outcome::StageOutcome;
    use crate::store::memory::InMemoryStore;

    fn pipeline(store: Arc<InMemoryStore>) -> Pipeline {
        Pipeline::new(
            store,
            Arc::new(StubEncoder::returning(vec![0.0, 1.0])),
            Arc::new(LocalFairness::new(FairnessAuditor::default())),
            Arc::new(LocalExplainer),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_default_selection_only_takes_unscored() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![0.0, 1.0]));
        let fresh: Vec<Uuid> = (0..3)
            .map(|i| {
                let resume = store.add_resume("python", Some(i), Some(vec![0.0, 1.0]));
                store.add_application(job, resume, None)
            })
            .collect();
        let scored_resume = store.add_resume("python", Some(8), Some(vec![1.0, 0.0]));
        let scored = store.add_application(job, scored_resume, Some(12.0));

        let summary = reprocess(&pipeline(store.clone()), ReprocessSelection::default(), 2)
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.processed, 3);
        for id in fresh {
            assert_eq!(store.application(id).score, Some(100.0));
        }
        assert_eq!(store.application(scored).score, Some(12.0));
    }

    #[tokio::test]
    async fn test_all_respects_limit() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![0.0, 1.0]));
        for i in 0..5 {
            let resume = store.add_resume("python", Some(i), Some(vec![0.0, 1.0]));
            store.add_application(job, resume, Some(50.0));
        }

        let summary = reprocess(
            &pipeline(store),
            ReprocessSelection {
                all: true,
                limit: 4,
            },
            3,
        )
        .await
        .unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.items.len(), 4);
    }

    #[tokio::test]
    async fn test_failures_are_tallied_not_fatal() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![0.0, 1.0]));
        let resume = store.add_resume("python", Some(1), Some(vec![0.0, 1.0]));
        store.add_application(job, resume, None);
        store.fail_writes();

        let summary = reprocess(&pipeline(store), ReprocessSelection::default(), 1)
            .await
            .unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.processed, 0);
        assert!(!summary.items[0].ok);
        assert!(summary.items[0].error.is_some());
    }

    struct PanickingExplainer;

    #[async_trait]
    impl ExplanationBackend for PanickingExplainer {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn explain(&self, _request: &ExplainRequest<'_>) -> StageOutcome<ExplanationResult> {
            panic!("explainer blew up");
        }
    }

    #[tokio::test]
    async fn test_panicked_worker_still_reported() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.add_job("Engineer", "python", Some(vec![0.0, 1.0]));
        let resume = store.add_resume("python", Some(1), Some(vec![0.0, 1.0]));
        let app = store.add_application(job, resume, None);

        let pipeline = Pipeline::new(
            store,
            Arc::new(StubEncoder::returning(vec![0.0, 1.0])),
            Arc::new(LocalFairness::new(FairnessAuditor::default())),
            Arc::new(PanickingExplainer),
            PipelineSettings::default(),
        );
        let summary = reprocess(&pipeline, ReprocessSelection::default(), 1)
            .await
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.items.len(), 1);
        assert_eq!(summary.items[0].application_id, app);
        assert!(!summary.items[0].ok);
        assert!(summary.items[0].error.as_deref().unwrap().starts_with("worker failed"));
    }

    #[test]
    fn test_selection_defaults_from_json() {
        let selection: ReprocessSelection = serde_json::from_str("{}").unwrap();
        assert!(!selection.all);
        assert_eq!(selection.limit, DEFAULT_LIMIT);
    }
}
