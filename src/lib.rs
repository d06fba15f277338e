//! scrapegate - License-gated, load-aware scraping job dispatch
//!
//! Clients submit scraping jobs with a license key. The dispatcher validates
//! the key against the license server (consuming monthly quota), picks the
//! least-loaded worker able to run the requested scraper, and relays the
//! worker's result.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`license`] - License records, quota enforcement, monthly reset
//! - [`routing`] - Load-aware worker selection
//! - [`worker`] - Scraper plugin registry and load sampling
//! - [`dispatch`] - Job submission pipeline
//! - [`admin`] - Session-guarded admin API
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`server`] - HTTP server shared by every role
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scrapegate::config::Config;
//! use scrapegate::dispatch::{Dispatcher, HttpJobForwarder};
//! use scrapegate::license::LicenseClient;
//! use scrapegate::routing::{HttpLoadProbe, LoadRouter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let router_config = config.router_config();
//!     let dispatcher = Dispatcher::new(
//!         Arc::new(LicenseClient::new(&config.dispatcher.license_url, config.license_timeout())?),
//!         LoadRouter::new(router_config, Arc::new(HttpLoadProbe::new(router_config.probe_timeout)?)),
//!         Arc::new(HttpJobForwarder::new(config.job_timeout())?),
//!         config.dispatcher.workers.clone(),
//!     );
//!     let data = dispatcher.submit("my-key", "news", Default::default()).await?;
//!     println!("{}", serde_json::Value::Object(data));
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod api;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod license;
pub mod metrics;
pub mod models;
pub mod routing;
pub mod server;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dispatch::{DispatchError, Dispatcher};
    pub use crate::error::{ErrorCategory, ScrapegateErrorTrait};
    pub use crate::license::{License, LicenseError, LicenseRegistry};
    pub use crate::models::{JobParams, ScraperSet, WorkerDescriptor};
    pub use crate::routing::{LoadRouter, RouteError, RouterConfig};
    pub use crate::worker::{PluginRegistry, ReloadPolicy, ScraperHandler};
}

// Direct re-exports for convenience
pub use models::{JobParams, ScraperSet, WorkerDescriptor};
