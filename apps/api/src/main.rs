mod cli;
mod config;
mod db;
mod embedding;
mod enrichment;
mod errors;
mod explanation;
mod fairness;
mod matching;
mod models;
mod outcome;
mod pipeline;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::create_pool;
use crate::embedding::{Encoder, HttpEncoder};
use crate::explanation::{ExplanationBackend, LocalExplainer, RemoteExplainer};
use crate::fairness::grouping::ExperienceBuckets;
use crate::fairness::{FairnessAuditor, FairnessBackend, LocalFairness, RemoteFairness};
use crate::pipeline::reprocess::reprocess;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::routes::build_router;
use crate::routes::health::DependencyProbe;
use crate::state::AppState;
use crate::store::{ApplicationStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    let command = Cli::parse().command();

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EquiHire API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn ApplicationStore> = Arc::new(PgStore::new(db));

    // Embedding provider: built once, shared read-only
    let http_encoder = HttpEncoder::new(&config.embedding_service_url, config.embedding_timeout);
    let mut probes = vec![DependencyProbe {
        name: "matcher_service",
        client: Some(http_encoder.client().clone()),
        enabled: true,
    }];
    let encoder: Arc<dyn Encoder> = Arc::new(http_encoder);
    info!("Embedding provider: {}", config.embedding_service_url);

    // Fairness backend: remote service if configured, in-process auditor otherwise
    let auditor = FairnessAuditor::new(config.fairness_thresholds.clone(), Arc::new(ExperienceBuckets));
    let fairness: Arc<dyn FairnessBackend> = match &config.fairness_service_url {
        Some(url) => {
            let remote = RemoteFairness::new(url, config.fairness_timeout, config.fairness_thresholds.clone());
            probes.push(DependencyProbe {
                name: "fairness_service",
                client: Some(remote.client().clone()),
                enabled: config.fairness_enabled,
            });
            Arc::new(remote)
        }
        None => {
            probes.push(DependencyProbe {
                name: "fairness_service",
                client: None,
                enabled: config.fairness_enabled,
            });
            Arc::new(LocalFairness::new(auditor.clone()))
        }
    };
    info!("Fairness backend: {}", fairness.name());

    // Explanation backend
    let explainer: Arc<dyn ExplanationBackend> = match &config.explainability_service_url {
        Some(url) => {
            let remote = RemoteExplainer::new(url, config.explainability_timeout);
            probes.push(DependencyProbe {
                name: "explainability_service",
                client: Some(remote.client().clone()),
                enabled: config.explainability_enabled,
            });
            Arc::new(remote)
        }
        None => {
            probes.push(DependencyProbe {
                name: "explainability_service",
                client: None,
                enabled: config.explainability_enabled,
            });
            Arc::new(LocalExplainer)
        }
    };
    info!("Explanation backend: {}", explainer.name());

    let pipeline = Pipeline::new(
        store.clone(),
        encoder.clone(),
        fairness,
        explainer,
        PipelineSettings {
            fairness_enabled: config.fairness_enabled,
            explanation_enabled: config.explainability_enabled,
            fairness_timeout: config.fairness_timeout,
            explanation_timeout: config.explainability_timeout,
        },
    );

    match command {
        Command::Reprocess(args) => {
            let concurrency = args.concurrency.unwrap_or(config.pipeline_concurrency);
            let summary = reprocess(&pipeline, args.selection(), concurrency).await?;
            println!("{}", cli::render_summary(&summary));
            Ok(())
        }
        Command::Serve(args) => {
            let port = args.port.unwrap_or(config.port);

            // Build app state
            let state = AppState {
                store,
                encoder,
                pipeline,
                auditor,
                probes: Arc::new(probes),
                config,
            };

            // Build router
            let app = build_router(state)
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()); // TODO: restrict origins once the recruiter UI host is fixed

            let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
            info!("Listening on {addr}");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;

            Ok(())
        }
    }
}
