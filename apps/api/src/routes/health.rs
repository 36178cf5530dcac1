use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::enrichment::{BackendHealth, EnrichmentClient};
use crate::state::AppState;

/// One enrichment backend as seen by `/health/dependencies`.
#[derive(Clone)]
pub struct DependencyProbe {
    pub name: &'static str,
    /// `None` when the stage runs in-process.
    pub client: Option<EnrichmentClient>,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub mode: &'static str,
    pub health: BackendHealth,
}

impl DependencyProbe {
    pub async fn check(&self) -> DependencyStatus {
        match (&self.client, self.enabled) {
            (_, false) => DependencyStatus {
                mode: if self.client.is_some() { "remote" } else { "local" },
                health: BackendHealth::Disabled,
            },
            (None, true) => DependencyStatus {
                mode: "local",
                health: BackendHealth::Healthy,
            },
            (Some(client), true) => DependencyStatus {
                mode: "remote",
                health: client.health().await,
            },
        }
    }
}

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "equihire-api"
    }))
}

/// GET /health/dependencies
/// Probes every enrichment backend. Always 200; an unavailable backend only degrades
/// the overall status, since every stage has a fallback.
pub async fn dependencies_handler(State(state): State<AppState>) -> Json<Value> {
    let mut dependencies = BTreeMap::new();
    for probe in state.probes.iter() {
        dependencies.insert(probe.name, probe.check().await);
    }

    let degraded = dependencies
        .values()
        .any(|d| matches!(d.health, BackendHealth::Unavailable { .. }));

    Json(json!({
        "status": if degraded { "degraded" } else { "healthy" },
        "dependencies": dependencies,
    }))
}
