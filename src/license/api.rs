//! REST API handlers for the license server

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{License, LicenseError, LicenseRegistry, NewLicense};
use crate::api::{common_routes, ApiError, StatusResponse};
use crate::models::ScraperSet;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub scrapers: ScraperSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLicenseRequest {
    pub key: String,

    /// ISO date or datetime
    pub valid_until: String,

    pub scrapers: ScraperSet,
    pub usage_per_month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteLicenseRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseListResponse {
    pub licenses: Vec<License>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the license server router
pub fn create_router(registry: LicenseRegistry) -> Router {
    Router::new()
        .route("/validate", post(validate_license))
        .route("/create_license", post(create_license))
        .route("/delete_license", post(delete_license))
        .route("/list_licenses", get(list_licenses))
        .with_state(registry)
        .merge(common_routes("license-server"))
}

/// Map a registry error to a response; `Storage` is the only server-side fault
fn license_error(err: LicenseError) -> ApiError {
    match err {
        LicenseError::NotFound => ApiError::not_found(err.to_string()),
        LicenseError::Storage(_) => {
            tracing::error!(error = %err, "License store failure");
            ApiError::internal("License store error")
        }
        _ => ApiError::bad_request(err.to_string()),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Validate a key and consume one unit of its monthly quota
async fn validate_license(
    State(registry): State<LicenseRegistry>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    match registry.validate(&request.key).await {
        Ok(scrapers) => Ok(Json(ValidateResponse {
            valid: true,
            scrapers,
        })),
        // Unknown keys are a client error here, not a missing resource
        Err(LicenseError::NotFound) => Err(ApiError::bad_request("Invalid license key")),
        Err(e) => Err(license_error(e)),
    }
}

async fn create_license(
    State(registry): State<LicenseRegistry>,
    Json(request): Json<CreateLicenseRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let license = NewLicense::parse(
        request.key,
        &request.valid_until,
        request.scrapers,
        request.usage_per_month,
    )
    .map_err(license_error)?;

    registry.create(license).await.map_err(license_error)?;
    Ok(Json(StatusResponse::new("License created")))
}

async fn delete_license(
    State(registry): State<LicenseRegistry>,
    Json(request): Json<DeleteLicenseRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    registry.delete(&request.key).await.map_err(license_error)?;
    Ok(Json(StatusResponse::new("License deleted")))
}

async fn list_licenses(
    State(registry): State<LicenseRegistry>,
) -> Result<Json<LicenseListResponse>, ApiError> {
    let licenses = registry.list().await.map_err(license_error)?;
    tracing::debug!(count = licenses.len(), "List licenses requested");
    Ok(Json(LicenseListResponse { licenses }))
}
