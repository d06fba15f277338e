//! Public REST API of the dispatcher

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::{DispatchError, Dispatcher};
use crate::api::{common_routes, ApiError};
use crate::models::{JobParams, ScrapeResponse};

/// Client job submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub license_key: String,
    pub scraper_name: String,

    #[serde(default)]
    pub params: JobParams,
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self::new(err.status_code(), err.detail())
    }
}

/// Create the dispatcher router
pub fn create_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/submit", post(submit_job))
        .with_state(dispatcher)
        .merge(common_routes("dispatcher"))
}

async fn submit_job(
    State(dispatcher): State<Dispatcher>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let data = dispatcher
        .submit(&request.license_key, &request.scraper_name, request.params)
        .await?;

    Ok(Json(ScrapeResponse::success(data)))
}
