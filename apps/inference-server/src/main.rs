// [[PAWS]]/apps/inference-server/src/main.rs
// Purpose: Entry point. Resolves optional collaborators, then starts the API server.
// Architecture: Application Boot
// Dependencies: Axum, Tokio, Tracing

mod alerts;
mod classifier;
mod config;
mod metrics;
mod models;
mod security;
mod server;
mod store;

use anyhow::Context;
use std::sync::Arc;

use crate::alerts::{AlertSink, DiscordAlertSink};
use crate::classifier::RemoteClassifier;
use crate::config::ServerConfig;
use crate::metrics::{Metrics, PredictionTracker};
use crate::server::AppState;
use crate::store::{MemoryPredictionStore, PredictionStore, RedisPredictionStore};

fn resolve_alert_sink(config: &ServerConfig) -> Option<Arc<dyn AlertSink>> {
    let url = match &config.discord_webhook_url {
        Some(url) => url.clone(),
        None => {
            tracing::warn!("DISCORD_WEBHOOK_URL not set. Discord alerting not available.");
            return None;
        }
    };

    match DiscordAlertSink::new(url) {
        Ok(sink) => {
            tracing::info!("Discord high latency alerting enabled");
            Some(Arc::new(sink))
        }
        Err(e) => {
            tracing::warn!("Failed to create Discord alert sink: {}. Alerting disabled.", e);
            None
        }
    }
}

fn resolve_store(config: &ServerConfig) -> Arc<dyn PredictionStore> {
    match &config.redis_url {
        Some(url) => match RedisPredictionStore::open(url) {
            Ok(store) => {
                tracing::info!("Redis client initialized: {}", url);
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to create Redis client: {}. Using an unbounded in-memory store.",
                    e
                );
                Arc::new(MemoryPredictionStore::new())
            }
        },
        None => {
            tracing::warn!(
                "REDIS_URL not set. Predictions are kept in memory only and never evicted."
            );
            Arc::new(MemoryPredictionStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("paws_inference=debug".parse()?)
                .add_directive("tower_http=trace".parse()?),
        )
        .init();

    tracing::info!("Initializing PAWS inference server...");

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let metrics = Metrics::new().context("failed to register metrics")?;
    let tracker = Arc::new(PredictionTracker::new(metrics, resolve_alert_sink(&config)));

    let classifier = RemoteClassifier::new(config.model_service_url.clone())
        .context("failed to build model service client")?;
    tracing::info!("Model service: {}", config.model_service_url);

    let state = Arc::new(AppState {
        api_token: config.api_token.clone(),
        tracker,
        store: resolve_store(&config),
        classifier: Arc::new(classifier),
    });

    let app = server::build_router(state, &config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("PAWS inference server listening on http://{}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
