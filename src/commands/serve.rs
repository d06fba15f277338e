use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use scrapegate::admin::{self, AdminState, SessionStore};
use scrapegate::config::Config;
use scrapegate::dispatch::{self, Dispatcher, HttpJobForwarder};
use scrapegate::license::{self, LicenseClient, LicenseRegistry, MonthlyReset};
use scrapegate::routing::{HttpLoadProbe, LoadRouter};
use scrapegate::server::{ctrl_c_signal, HttpServer, ServerConfig};
use scrapegate::worker::{self, PluginRegistry, SystemLoadSampler};

/// Server config for one role: the role's bind address (or the CLI
/// override) plus the shared `[http]` toggles
fn server_config(config: &Config, bind_address: SocketAddr, bind_override: Option<SocketAddr>) -> ServerConfig {
    ServerConfig::builder()
        .bind_address(bind_override.unwrap_or(bind_address))
        .enable_cors(config.http.enable_cors)
        .enable_request_logging(config.http.enable_request_logging)
        .build()
}

fn load_router(config: &Config) -> Result<LoadRouter> {
    let router_config = config.router_config();
    let probe = HttpLoadProbe::new(router_config.probe_timeout).context("Failed to create load probe")?;
    Ok(LoadRouter::new(router_config, Arc::new(probe)))
}

fn print_endpoints(server: &HttpServer, endpoints: &[&str]) {
    println!("{}", server.info().display());
    println!();
    println!("API Endpoints:");
    for endpoint in endpoints {
        println!("  {endpoint}");
    }
    println!("  GET  /health");
    println!("  GET  /metrics");
    println!();
    println!("Press Ctrl+C to stop.\n");
}

// ============================================================================
// License Server
// ============================================================================

pub async fn license_server(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let section = &config.license_server;

    let registry = LicenseRegistry::open(&section.database_path).with_context(|| {
        format!(
            "Failed to open license database: {}",
            section.database_path.display()
        )
    })?;

    let reset_task = MonthlyReset::new(registry.clone()).spawn();

    let server = HttpServer::new(
        "license-server",
        server_config(&config, section.bind_address, bind),
        license::api::create_router(registry),
    );

    print_endpoints(
        &server,
        &[
            "POST /validate",
            "POST /create_license",
            "POST /delete_license",
            "GET  /list_licenses",
        ],
    );

    server.start_with_shutdown(ctrl_c_signal()).await?;
    reset_task.abort();

    println!("License server stopped.");
    Ok(())
}

// ============================================================================
// Dispatcher
// ============================================================================

pub async fn dispatcher(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let section = &config.dispatcher;

    if section.workers.is_empty() {
        tracing::warn!("No workers configured; every submission will be rejected");
    }

    let validator = LicenseClient::new(&section.license_url, config.license_timeout())
        .context("Failed to create license client")?;
    let forwarder =
        HttpJobForwarder::new(config.job_timeout()).context("Failed to create job forwarder")?;

    let dispatcher = Dispatcher::new(
        Arc::new(validator),
        load_router(&config)?,
        Arc::new(forwarder),
        section.workers.clone(),
    );

    let server = HttpServer::new(
        "dispatcher",
        server_config(&config, section.bind_address, bind),
        dispatch::api::create_router(dispatcher),
    );

    println!("  License server: {}", section.license_url);
    for worker in &section.workers {
        println!("  Worker {}: {} {}", worker.name, worker.base_url(), worker.scrapers);
    }
    print_endpoints(&server, &["POST /submit"]);

    server.start_with_shutdown(ctrl_c_signal()).await?;

    println!("Dispatcher stopped.");
    Ok(())
}

// ============================================================================
// Worker
// ============================================================================

pub async fn worker(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let section = &config.worker;

    if !section.plugin_dir.is_dir() {
        tracing::warn!(
            dir = %section.plugin_dir.display(),
            "Plugin directory does not exist yet; no scrapers will load until it does"
        );
    }

    let registry = Arc::new(PluginRegistry::new(&section.plugin_dir, section.reload));

    // Load once up front so `/scrapers` is meaningful before the first job.
    match registry.reload().await {
        Ok(summary) => tracing::info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            "Initial plugin load"
        ),
        Err(e) => tracing::warn!(error = %e, "Initial plugin load failed"),
    }
    let reloader = registry.spawn_reloader();

    let state = worker::api::WorkerState {
        registry,
        sampler: Arc::new(SystemLoadSampler::new()),
    };

    let server = HttpServer::new(
        "worker",
        server_config(&config, section.bind_address, bind),
        worker::api::create_router(state),
    );

    println!("  Plugin directory: {}", section.plugin_dir.display());
    println!("  Reload policy: {:?}", section.reload);
    print_endpoints(
        &server,
        &["POST /scrape", "GET  /load", "GET  /scrapers", "POST /reload"],
    );

    server.start_with_shutdown(ctrl_c_signal()).await?;
    if let Some(task) = reloader {
        task.abort();
    }

    println!("Worker stopped.");
    Ok(())
}

// ============================================================================
// Admin API
// ============================================================================

pub async fn admin(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let secret = config
        .admin
        .admin_secret
        .clone()
        .context("admin_secret must be set (config [admin] or SCRAPEGATE_ADMIN_SECRET)")?;

    let licenses = LicenseClient::new(&config.dispatcher.license_url, config.license_timeout())
        .context("Failed to create license client")?;

    let state = AdminState {
        sessions: Arc::new(SessionStore::new(secret)),
        licenses,
        router: load_router(&config)?,
        workers: Arc::new(config.dispatcher.workers.clone()),
    };

    let server = HttpServer::new(
        "admin",
        server_config(&config, config.admin.bind_address, bind),
        admin::create_router(state),
    );

    print_endpoints(
        &server,
        &[
            "POST /login",
            "POST /logout",
            "GET  /api/licenses",
            "POST /api/create_license",
            "POST /api/delete_license",
            "GET  /api/server_loads",
        ],
    );

    server.start_with_shutdown(ctrl_c_signal()).await?;

    println!("Admin API stopped.");
    Ok(())
}
