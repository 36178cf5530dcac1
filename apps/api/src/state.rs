use std::sync::Arc;

use crate::config::Config;
use crate::embedding::Encoder;
use crate::fairness::FairnessAuditor;
use crate::pipeline::Pipeline;
use crate::routes::health::DependencyProbe;
use crate::store::ApplicationStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ApplicationStore>,
    /// Shared, read-only embedding provider. Also held by the pipeline.
    pub encoder: Arc<dyn Encoder>,
    pub pipeline: Pipeline,
    /// In-process auditor behind the on-demand fairness and mitigation endpoints.
    pub auditor: FairnessAuditor,
    pub probes: Arc<Vec<DependencyProbe>>,
    pub config: Config,
}
