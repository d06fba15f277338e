//! Admin API tests against a live license server

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Router;
use serde_json::json;

use super::{http_load_router, LicenseFixture};
use crate::common::{mock_worker_with_load, send_json, worker_for, ADMIN_SECRET};
use scrapegate::admin::{create_router, AdminState, SessionStore};
use scrapegate::models::WorkerDescriptor;

fn admin_router(license: &LicenseFixture, workers: Vec<WorkerDescriptor>) -> Router {
    create_router(AdminState {
        sessions: Arc::new(SessionStore::new(ADMIN_SECRET)),
        licenses: license.client(),
        router: http_load_router(),
        workers: Arc::new(workers),
    })
}

async fn login(router: &Router) -> String {
    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/login",
        Some(json!({ "secret": ADMIN_SECRET })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_session_guard() {
    let license = LicenseFixture::start().await;
    let router = admin_router(&license, Vec::new());

    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/login",
        Some(json!({ "secret": "wrong" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Invalid admin secret. Access denied.");

    let (status, body) = send_json(router.clone(), "GET", "/api/licenses", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Unauthorized");

    let token = login(&router).await;
    let (status, _) = send_json(router.clone(), "GET", "/api/licenses", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(router.clone(), "POST", "/logout", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(router, "GET", "/api/licenses", None, Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_license_management_round_trip() {
    let license = LicenseFixture::start().await;
    let router = admin_router(&license, Vec::new());
    let token = login(&router).await;

    let new_license = json!({
        "key": "acme",
        "valid_until": "2031-03-31",
        "scrapers": ["news", "shop"],
        "usage_per_month": 250
    });

    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/api/create_license",
        Some(new_license.clone()),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "License created");

    // Duplicate keys are relayed with the license server's status
    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/api/create_license",
        Some(new_license),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "License key already exists");

    let (status, body) = send_json(router.clone(), "GET", "/api/licenses", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let licenses = body["licenses"].as_array().unwrap();
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0]["key"], "acme");
    assert_eq!(licenses[0]["usage_per_month"], 250);
    assert_eq!(licenses[0]["usage_count"], 0);

    let (status, _) = send_json(
        router.clone(),
        "POST",
        "/api/delete_license",
        Some(json!({ "key": "acme" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(
        router,
        "POST",
        "/api/delete_license",
        Some(json!({ "key": "acme" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "License key not found");
}

#[tokio::test]
async fn test_create_license_validation() {
    let license = LicenseFixture::start().await;
    let router = admin_router(&license, Vec::new());
    let token = login(&router).await;

    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/api/create_license",
        Some(json!({ "key": "partial", "scrapers": ["all"] })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Missing required fields");

    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/api/create_license",
        Some(json!(null)),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "No data provided");

    let (status, body) = send_json(
        router,
        "POST",
        "/api/delete_license",
        Some(json!({})),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "License key is required");

    assert!(license.registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_loads() {
    let license = LicenseFixture::start().await;
    let busy = mock_worker_with_load(64.5).await;
    let gone = wiremock::MockServer::start().await;
    let gone_worker = worker_for(&gone, "gone", &["all"]);
    drop(gone);

    let router = admin_router(&license, vec![worker_for(&busy, "busy", &["all"]), gone_worker]);
    let token = login(&router).await;

    let (status, body) = send_json(router, "GET", "/api/server_loads", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server_loads"]["busy"], json!(64.5));
    assert_eq!(body["server_loads"]["gone"], "Unreachable");
}
