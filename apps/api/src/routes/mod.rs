pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::fairness::handlers as fairness;
use crate::matching::handlers as matching;
use crate::pipeline::handlers as pipeline;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/health/dependencies", get(health::dependencies_handler))
        // Applications
        .route(
            "/api/v1/applications/:id",
            get(pipeline::handle_get_application),
        )
        .route(
            "/api/v1/applications/:id/process",
            post(pipeline::handle_process_application),
        )
        .route(
            "/api/v1/applications/:id/status",
            patch(pipeline::handle_update_status),
        )
        .route("/api/v1/pipeline/reprocess", post(pipeline::handle_reprocess))
        // Jobs
        .route("/api/v1/jobs/:id/matches", get(matching::handle_job_matches))
        .route("/api/v1/jobs/:id/fairness", get(fairness::handle_job_fairness))
        .route(
            "/api/v1/jobs/:id/mitigate",
            post(fairness::handle_job_mitigation),
        )
        .with_state(state)
}
