//! Integration tests module
//!
//! End-to-end tests that run the license server and workers on ephemeral
//! ports and drive the dispatcher and admin routers in-process.

pub mod admin_test;
pub mod dispatch_test;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::NaiveDate;
use scrapegate::dispatch::{Dispatcher, HttpJobForwarder};
use scrapegate::license::{api as license_api, LicenseClient, LicenseRegistry, NewLicense};
use scrapegate::models::{ScraperSet, WorkerDescriptor};
use scrapegate::routing::{HttpLoadProbe, LoadRouter, RouterConfig};
use scrapegate::worker::api::{create_router as worker_router, WorkerState};
use scrapegate::worker::{FixedLoadSampler, PluginRegistry, ReloadPolicy};
use tempfile::TempDir;

/// Serve `router` on an ephemeral local port
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A license server backed by an in-memory registry
pub struct LicenseFixture {
    pub registry: LicenseRegistry,
    pub url: String,
}

impl LicenseFixture {
    pub async fn start() -> Self {
        let registry = LicenseRegistry::in_memory().unwrap();
        let addr = spawn_router(license_api::create_router(registry.clone())).await;
        Self {
            registry,
            url: format!("http://{addr}"),
        }
    }

    pub async fn add(&self, key: &str, scrapers: &[&str], quota: u32) {
        self.registry
            .create(NewLicense {
                key: key.to_string(),
                valid_until: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
                scrapers: ScraperSet::new(scrapers.iter().copied()),
                usage_per_month: quota,
            })
            .await
            .unwrap();
    }

    pub fn client(&self) -> LicenseClient {
        LicenseClient::new(&self.url, Duration::from_secs(5)).unwrap()
    }
}

/// A real worker serving definitions from a temporary directory
pub struct WorkerFixture {
    pub descriptor: WorkerDescriptor,
    pub dir: TempDir,
}

impl WorkerFixture {
    pub async fn start(name: &str, scrapers: &[&str], load: f64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = WorkerState {
            registry: Arc::new(PluginRegistry::new(dir.path(), ReloadPolicy::OnLookup)),
            sampler: Arc::new(FixedLoadSampler::new(load, load)),
        };
        let addr = spawn_router(worker_router(state)).await;

        Self {
            descriptor: WorkerDescriptor::new(
                name,
                addr.ip().to_string(),
                addr.port(),
                ScraperSet::new(scrapers.iter().copied()),
            ),
            dir,
        }
    }
}

pub fn http_load_router() -> LoadRouter {
    let config = RouterConfig::builder()
        .threshold(80.0)
        .probe_timeout(Duration::from_secs(2))
        .build();
    LoadRouter::new(config, Arc::new(HttpLoadProbe::new(config.probe_timeout).unwrap()))
}

pub fn dispatcher(license: &LicenseFixture, workers: Vec<WorkerDescriptor>) -> Dispatcher {
    Dispatcher::new(
        Arc::new(license.client()),
        http_load_router(),
        Arc::new(HttpJobForwarder::new(Duration::from_secs(5)).unwrap()),
        workers,
    )
}
