//! REST API handlers for the worker

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::load::LoadSampler;
use super::plugins::PluginRegistry;
use crate::api::{common_routes, ApiError};
use crate::error::ScrapegateErrorTrait;
use crate::models::{ScrapeRequest, ScrapeResponse};
use crate::routing::LoadResponse;

/// Shared state for worker handlers
#[derive(Clone)]
pub struct WorkerState {
    pub registry: Arc<PluginRegistry>,
    pub sampler: Arc<dyn LoadSampler>,
}

/// Body of `GET /scrapers` and `POST /reload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapersResponse {
    pub scrapers: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the worker router
pub fn create_router(state: WorkerState) -> Router {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/load", get(load))
        .route("/scrapers", get(list_scrapers))
        .route("/reload", post(reload))
        .with_state(state)
        .merge(common_routes("worker"))
}

// ============================================================================
// Handlers
// ============================================================================

/// Run one scraper job
async fn scrape(
    State(state): State<WorkerState>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let Some(handler) = state.registry.get(&request.scraper_name).await else {
        tracing::warn!(scraper = %request.scraper_name, "Scraper not found");
        return Err(ApiError::not_found("Scraper not found"));
    };

    tracing::info!(scraper = %request.scraper_name, "Running scraper");

    match handler.run(&request.params).await {
        Ok(data) => Ok(Json(ScrapeResponse::success(data))),
        Err(e) => {
            tracing::error!(
                scraper = %request.scraper_name,
                category = e.category().as_str(),
                recoverable = e.is_recoverable(),
                error = %e,
                "Scraper failed"
            );
            Err(ApiError::internal(e.to_string()))
        }
    }
}

/// Current host load
async fn load(State(state): State<WorkerState>) -> impl IntoResponse {
    let sample = state.sampler.sample().await;
    tracing::debug!(cpu = sample.cpu, memory = sample.memory, "Load sampled");

    Json(LoadResponse {
        load: sample.combined(),
    })
}

/// Loaded scrapers and per-file load errors
async fn list_scrapers(State(state): State<WorkerState>) -> impl IntoResponse {
    Json(snapshot(&state.registry).await)
}

/// Force a rescan of the plugin directory
async fn reload(State(state): State<WorkerState>) -> Result<Json<ScrapersResponse>, ApiError> {
    state.registry.reload().await.map_err(|e| {
        tracing::error!(error = %e, "Forced plugin reload failed");
        ApiError::internal(e.to_string())
    })?;

    Ok(Json(snapshot(&state.registry).await))
}

async fn snapshot(registry: &PluginRegistry) -> ScrapersResponse {
    ScrapersResponse {
        scrapers: registry.names().await,
        errors: registry.load_errors().await,
    }
}
