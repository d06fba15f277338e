//! Worker ("scraper server") role
//!
//! Runs scraper jobs forwarded by the dispatcher and reports host load so the
//! dispatcher can pick the least-busy worker.
//!
//! - [`definition`]: declarative scraper definitions and URL templates
//! - [`handler`]: the [`ScraperHandler`] trait and the selector-based handler
//! - [`plugins`]: the directory-backed [`PluginRegistry`]
//! - [`load`]: host load sampling
//! - [`api`]: HTTP endpoints

pub mod api;
pub mod definition;
pub mod handler;
pub mod load;
pub mod plugins;

use thiserror::Error;

pub use definition::{FieldSpec, ScraperDefinition, UrlTemplate};
pub use handler::{ScraperHandler, SelectorScraper};
pub use load::{FixedLoadSampler, LoadSample, LoadSampler, SystemLoadSampler};
pub use plugins::{PluginRegistry, ReloadPolicy, ReloadSummary};

/// Failure to load a scraper definition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid scraper definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("Failed to scan plugin directory {path}: {reason}")]
    Scan { path: String, reason: String },
}

/// Failure while running a scraper job
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Target returned HTTP {status}")]
    Status { status: u16 },
}
