//! Common test utilities

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use scrapegate::models::{ScraperSet, WorkerDescriptor};
use std::path::Path;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A fixed admin secret for tests
pub const ADMIN_SECRET: &str = "3f2b8c1d-5e6a-4b7c-8d9e-0a1b2c3d4e5f";

/// Worker descriptor pointing at a mock server
pub fn worker_for(server: &MockServer, name: &str, scrapers: &[&str]) -> WorkerDescriptor {
    let addr = server.address();
    WorkerDescriptor::new(
        name,
        addr.ip().to_string(),
        addr.port(),
        ScraperSet::new(scrapers.iter().copied()),
    )
}

/// Start a mock worker answering `GET /load` with `load`
pub async fn mock_worker_with_load(load: f64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/load"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "load": load })))
        .mount(&server)
        .await;
    server
}

/// Write a scraper definition file
pub fn write_definition(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(format!("{name}.toml")), contents).expect("write definition");
}

/// Send a JSON request through a router and decode the JSON response
pub async fn send_json(
    router: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = router.oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, json)
}
