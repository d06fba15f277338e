//! Plugin registry and worker endpoint tests

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{send_json, write_definition};
use scrapegate::worker::api::{create_router, WorkerState};
use scrapegate::worker::{FixedLoadSampler, PluginRegistry, ReloadPolicy, ScrapeError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCT_PAGE: &str = r#"
<html>
  <body>
    <h1 class="title">  Blue
        Widget </h1>
    <span class="price">19.99</span>
    <img class="gallery" src="/a.png">
    <img class="gallery" src="/b.png">
  </body>
</html>
"#;

async fn product_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/42"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PRODUCT_PAGE, "text/html"))
        .mount(&server)
        .await;
    server
}

fn product_definition(base: &str) -> String {
    format!(
        r#"
description = "Product detail page"
url = "{base}/items/{{item_id}}"

[fields.title]
selector = "h1.title"

[fields.price]
selector = ".price"

[fields.images]
selector = "img.gallery"
attr = "src"
all = true
"#
    )
}

#[tokio::test]
async fn test_selector_scraper_end_to_end() {
    let site = product_site().await;
    let dir = tempfile::tempdir().unwrap();
    write_definition(dir.path(), "product", &product_definition(&site.uri()));

    let registry = PluginRegistry::new(dir.path(), ReloadPolicy::OnLookup);
    let handler = registry.get("product").await.expect("product scraper");

    let params = json!({ "item_id": 42 }).as_object().cloned().unwrap();
    let data = handler.run(&params).await.unwrap();

    assert_eq!(data["url"], json!(format!("{}/items/42", site.uri())));
    assert_eq!(data["title"], json!("Blue Widget"));
    assert_eq!(data["price"], json!("19.99"));
    assert_eq!(data["images"], json!(["/a.png", "/b.png"]));
}

#[tokio::test]
async fn test_missing_parameter_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_definition(dir.path(), "product", &product_definition("http://127.0.0.1:9"));

    let registry = PluginRegistry::new(dir.path(), ReloadPolicy::OnLookup);
    let handler = registry.get("product").await.unwrap();

    let result = handler.run(&Default::default()).await;
    assert_eq!(result, Err(ScrapeError::MissingParameter("item_id".to_string())));
}

#[tokio::test]
async fn test_reload_uses_latest_definition() {
    let site = product_site().await;
    let dir = tempfile::tempdir().unwrap();
    let registry = PluginRegistry::new(dir.path(), ReloadPolicy::Manual);

    write_definition(
        dir.path(),
        "product",
        &format!("url = \"{}/items/{{item_id}}\"\n[fields.title]\nselector = \"h1\"\n", site.uri()),
    );
    registry.reload().await.unwrap();

    write_definition(
        dir.path(),
        "product",
        &format!("url = \"{}/items/{{item_id}}\"\n[fields.cost]\nselector = \".price\"\n", site.uri()),
    );
    registry.reload().await.unwrap();

    let params = json!({ "item_id": "42" }).as_object().cloned().unwrap();
    let data = registry.get("product").await.unwrap().run(&params).await.unwrap();
    assert_eq!(data.get("cost"), Some(&json!("19.99")));
    assert!(data.get("title").is_none());
}

#[tokio::test]
async fn test_removed_and_broken_definitions() {
    let dir = tempfile::tempdir().unwrap();
    let registry = PluginRegistry::new(dir.path(), ReloadPolicy::Manual);

    write_definition(dir.path(), "news", "url = \"https://example.com/{id}\"\n");
    write_definition(dir.path(), "shop", "url = \"https://example.com/{sku}\"\n");
    let summary = registry.reload().await.unwrap();
    assert_eq!(summary.loaded, vec!["news".to_string(), "shop".to_string()]);

    std::fs::remove_file(dir.path().join("news.toml")).unwrap();
    write_definition(dir.path(), "shop", "url = \"ftp://example.com\"\n");
    let summary = registry.reload().await.unwrap();

    assert_eq!(summary.removed, vec!["news".to_string()]);
    assert_eq!(summary.failed, vec!["shop".to_string()]);
    assert!(registry.names().await.is_empty());

    let errors = registry.load_errors().await;
    assert!(errors.contains_key("shop"));
    assert!(!errors.contains_key("news"));
}

#[tokio::test]
async fn test_worker_endpoints() {
    let site = product_site().await;
    let dir = tempfile::tempdir().unwrap();
    write_definition(dir.path(), "product", &product_definition(&site.uri()));
    write_definition(dir.path(), "broken", "url = 12\n");

    let registry = Arc::new(PluginRegistry::new(dir.path(), ReloadPolicy::OnLookup));
    let router = create_router(WorkerState {
        registry,
        sampler: Arc::new(FixedLoadSampler::new(35.0, 60.0)),
    });

    let (status, body) = send_json(router.clone(), "GET", "/load", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["load"], json!(60.0));

    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/scrape",
        Some(json!({ "scraper_name": "product", "params": { "item_id": 42 } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["title"], "Blue Widget");

    let (status, body) = send_json(
        router.clone(),
        "POST",
        "/scrape",
        Some(json!({ "scraper_name": "missing", "params": {} })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Scraper not found");

    let (status, body) = send_json(router, "POST", "/reload", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scrapers"], json!(["product"]));
    assert!(body["errors"]["broken"].is_string());
}
