//! Admin JSON API
//!
//! Proxies license management to the license server and reports worker load.
//! Everything except `/login` and `/health` requires a session token.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::session::{parse_bearer, SessionStore};
use crate::api::{common_routes, ApiError, StatusResponse};
use crate::client::ClientError;
use crate::license::api::{CreateLicenseRequest, LicenseListResponse};
use crate::license::LicenseClient;
use crate::models::WorkerDescriptor;
use crate::routing::{LoadReport, LoadRouter};

/// Fields `POST /api/create_license` must carry
const REQUIRED_LICENSE_FIELDS: [&str; 4] = ["key", "valid_until", "scrapers", "usage_per_month"];

/// Shared state for admin handlers
#[derive(Clone)]
pub struct AdminState {
    pub sessions: Arc<SessionStore>,
    pub licenses: LicenseClient,
    pub router: LoadRouter,
    pub workers: Arc<Vec<WorkerDescriptor>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLoadsResponse {
    pub server_loads: BTreeMap<String, Value>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the admin router
pub fn create_router(state: AdminState) -> Router {
    let guarded = Router::new()
        .route("/logout", post(logout))
        .route("/api/licenses", get(list_licenses))
        .route("/api/create_license", post(create_license))
        .route("/api/delete_license", post(delete_license))
        .route("/api/server_loads", get(server_loads))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/login", post(login))
        .merge(guarded)
        .with_state(state)
        .merge(common_routes("admin"))
}

/// Reject requests without a live session token
async fn require_session(State(state): State<AdminState>, request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer);

    match token {
        Some(token) if state.sessions.is_valid(&token).await => next.run(request).await,
        _ => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        )
            .into_response(),
    }
}

/// Relay a license-server failure: its own status and detail, or 500 when
/// it could not be reached
fn license_server_error(action: &str, err: ClientError) -> ApiError {
    match err {
        ClientError::HttpError { status, message } => {
            tracing::warn!(status, detail = %message, "License {action} failed");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            ApiError::new(status, message)
        }
        other => {
            tracing::error!(error = %other, "License server error during license {action}");
            ApiError::internal("License server error")
        }
    }
}

// ============================================================================
// Session Handlers
// ============================================================================

async fn login(
    State(state): State<AdminState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    match state.sessions.login(&request.secret).await {
        Some(token) => {
            tracing::info!("Admin logged in successfully");
            Ok(Json(LoginResponse { token }))
        }
        None => {
            tracing::warn!("Failed admin login attempt");
            Err(ApiError::new(StatusCode::FORBIDDEN, "Invalid admin secret. Access denied."))
        }
    }
}

async fn logout(State(state): State<AdminState>, request: Request) -> Json<StatusResponse> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer);

    if let Some(token) = token {
        state.sessions.logout(&token).await;
    }

    Json(StatusResponse::new("Logged out"))
}

// ============================================================================
// License Handlers
// ============================================================================

async fn list_licenses(
    State(state): State<AdminState>,
) -> Result<Json<LicenseListResponse>, ApiError> {
    let licenses = state.licenses.list().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch licenses from license server");
        ApiError::internal("Failed to fetch licenses")
    })?;

    Ok(Json(LicenseListResponse { licenses }))
}

async fn create_license(
    State(state): State<AdminState>,
    Json(body): Json<Value>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Some(fields) = body.as_object() else {
        return Err(ApiError::bad_request("No data provided"));
    };
    if !REQUIRED_LICENSE_FIELDS.iter().all(|f| fields.contains_key(*f)) {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let request: CreateLicenseRequest =
        serde_json::from_value(body).map_err(|e| ApiError::bad_request(e.to_string()))?;

    state
        .licenses
        .create(&request)
        .await
        .map_err(|e| license_server_error("creation", e))?;

    tracing::info!(key = %request.key, "License created via admin API");
    Ok(Json(StatusResponse::new("License created")))
}

async fn delete_license(
    State(state): State<AdminState>,
    Json(body): Json<Value>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Some(key) = body.get("key").and_then(Value::as_str) else {
        return Err(ApiError::bad_request("License key is required"));
    };

    state
        .licenses
        .delete(key)
        .await
        .map_err(|e| license_server_error("deletion", e))?;

    tracing::info!(key = %key, "License deleted via admin API");
    Ok(Json(StatusResponse::new("License deleted")))
}

// ============================================================================
// Load Handlers
// ============================================================================

async fn server_loads(State(state): State<AdminState>) -> Json<ServerLoadsResponse> {
    let reports = state.router.probe_all(&state.workers).await;

    let server_loads = reports
        .into_iter()
        .map(|(worker, report)| {
            let value = match report {
                LoadReport::Load(load) => Value::from(load),
                LoadReport::Error => Value::from("Error"),
                LoadReport::Unreachable => Value::from("Unreachable"),
            };
            (worker.name, value)
        })
        .collect();

    Json(ServerLoadsResponse { server_loads })
}
