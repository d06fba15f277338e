//! Dispatcher end-to-end tests

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{dispatcher, http_load_router, LicenseFixture, WorkerFixture};
use crate::common::{mock_worker_with_load, send_json, worker_for, write_definition};
use scrapegate::dispatch::api::create_router;
use scrapegate::dispatch::{Dispatcher, HttpJobForwarder};
use scrapegate::license::LicenseClient;

async fn article_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/articles/7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><h1>Launch day</h1><p class=\"by\">Ana</p></html>", "text/html"),
        )
        .mount(&server)
        .await;
    server
}

fn submit_body(key: &str, scraper: &str) -> serde_json::Value {
    json!({ "license_key": key, "scraper_name": scraper, "params": { "id": 7 } })
}

#[tokio::test]
async fn test_submit_runs_on_least_loaded_worker() {
    let site = article_site().await;
    let license = LicenseFixture::start().await;
    license.add("client-1", &["article"], 5).await;

    // Each worker extracts a different field so the result shows who ran it
    let hot = WorkerFixture::start("hot", &["article"], 70.0).await;
    write_definition(
        hot.dir.path(),
        "article",
        &format!("url = \"{}/articles/{{id}}\"\n[fields.from_hot]\nselector = \"h1\"\n", site.uri()),
    );
    let cool = WorkerFixture::start("cool", &["all"], 15.0).await;
    write_definition(
        cool.dir.path(),
        "article",
        &format!(
            "url = \"{}/articles/{{id}}\"\n[fields.headline]\nselector = \"h1\"\n[fields.author]\nselector = \".by\"\n",
            site.uri()
        ),
    );

    let router = create_router(dispatcher(
        &license,
        vec![hot.descriptor.clone(), cool.descriptor.clone()],
    ));

    let (status, body) =
        send_json(router, "POST", "/submit", Some(submit_body("client-1", "article")), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["headline"], "Launch day");
    assert_eq!(body["data"]["author"], "Ana");
    assert!(body["data"].get("from_hot").is_none());

    let licenses = license.registry.list().await.unwrap();
    assert_eq!(licenses[0].usage_count, 1);
}

#[tokio::test]
async fn test_unauthorized_scraper_is_rejected_even_with_idle_workers() {
    let license = LicenseFixture::start().await;
    license.add("client-1", &["news"], 5).await;

    let idle = mock_worker_with_load(1.0).await;
    let router = create_router(dispatcher(&license, vec![worker_for(&idle, "idle", &["all"])]));

    let (status, body) =
        send_json(router, "POST", "/submit", Some(submit_body("client-1", "article")), None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Scraper not allowed for this license");
    assert!(idle.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_license_rejections() {
    let license = LicenseFixture::start().await;
    license.add("one-shot", &["all"], 1).await;

    let worker = mock_worker_with_load(95.0).await;
    let router = create_router(dispatcher(&license, vec![worker_for(&worker, "w", &["all"])]));

    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/submit",
        Some(submit_body("unknown", "article")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid license key"));

    // The first call consumes the only unit, then fails on load
    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/submit",
        Some(submit_body("one-shot", "article")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "No scraper servers available below load thresholds");

    let (status, body) =
        send_json(router, "POST", "/submit", Some(submit_body("one-shot", "article")), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("License usage limit reached"));
}

#[tokio::test]
async fn test_no_worker_configured_for_scraper() {
    let license = LicenseFixture::start().await;
    license.add("client-1", &["all"], 5).await;

    let worker = mock_worker_with_load(5.0).await;
    let router = create_router(dispatcher(&license, vec![worker_for(&worker, "w", &["news"])]));

    let (status, body) =
        send_json(router, "POST", "/submit", Some(submit_body("client-1", "article")), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "No scraper servers available for this scraper");
}

#[tokio::test]
async fn test_worker_failure_is_500() {
    let license = LicenseFixture::start().await;
    license.add("client-1", &["all"], 5).await;

    let worker = mock_worker_with_load(5.0).await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "boom" })))
        .mount(&worker)
        .await;

    let router = create_router(dispatcher(&license, vec![worker_for(&worker, "w", &["all"])]));
    let (status, body) =
        send_json(router, "POST", "/submit", Some(submit_body("client-1", "article")), None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Scraper server error");
}

#[tokio::test]
async fn test_license_server_down_is_500() {
    let down = MockServer::start().await;
    let url = down.uri();
    drop(down);

    let dispatcher = Dispatcher::new(
        Arc::new(LicenseClient::new(url, Duration::from_secs(2)).unwrap()),
        http_load_router(),
        Arc::new(HttpJobForwarder::new(Duration::from_secs(2)).unwrap()),
        Vec::new(),
    );

    let (status, body) = send_json(
        create_router(dispatcher),
        "POST",
        "/submit",
        Some(submit_body("client-1", "article")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "License server error");
}
