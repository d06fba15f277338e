//! Configuration management for scrapegate
//!
//! One TOML file configures every role; each role reads only its own section.
//! Selected keys can be overridden with `SCRAPEGATE_*` environment variables.
//!
//! ```toml
//! [license_server]
//! bind_address = "0.0.0.0:8000"
//! database_path = "data/licenses.db"
//!
//! [dispatcher]
//! bind_address = "0.0.0.0:8080"
//! license_url = "http://127.0.0.1:8000"
//!
//! [[dispatcher.workers]]
//! name = "worker-1"
//! ip = "127.0.0.1"
//! port = 8001
//! scrapers = ["all"]
//!
//! [worker]
//! bind_address = "0.0.0.0:8001"
//! plugin_dir = "scrapers"
//! reload = { mode = "on_lookup" }
//!
//! [admin]
//! bind_address = "127.0.0.1:5000"
//! admin_secret = "6f1c2a4e-0d3b-4c5a-9e8f-7a6b5c4d3e2f"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::WorkerDescriptor;
use crate::routing::RouterConfig;
use crate::worker::ReloadPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub license_server: LicenseServerConfig,
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
    pub admin: AdminConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// `[license_server]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseServerConfig {
    pub bind_address: SocketAddr,

    /// SQLite database file
    pub database_path: PathBuf,
}

/// `[dispatcher]`, also read by the admin role for the license server URL
/// and the worker list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub bind_address: SocketAddr,

    /// Base URL of the license server
    pub license_url: String,

    pub license_timeout_secs: u64,
    pub job_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,

    pub workers: Vec<WorkerDescriptor>,
}

/// `[worker]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub bind_address: SocketAddr,

    /// Directory holding scraper definition files
    pub plugin_dir: PathBuf,

    pub reload: ReloadPolicy,
}

/// `[admin]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub bind_address: SocketAddr,

    /// Shared login secret; must be a UUID. Required to run the admin role.
    pub admin_secret: Option<String>,
}

/// `[http]`, applied to every role's server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enable_cors: bool,
    pub enable_request_logging: bool,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

// ============================================================================
// Defaults
// ============================================================================

fn socket(addr: [u8; 4], port: u16) -> SocketAddr {
    SocketAddr::from((addr, port))
}

impl Default for LicenseServerConfig {
    fn default() -> Self {
        Self {
            bind_address: socket([0, 0, 0, 0], 8000),
            database_path: PathBuf::from("data/licenses.db"),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bind_address: socket([0, 0, 0, 0], 8080),
            license_url: String::from("http://127.0.0.1:8000"),
            license_timeout_secs: 5,
            job_timeout_secs: 30,
            probe_timeout_secs: 5,
            cpu_threshold: 80.0,
            memory_threshold: 80.0,
            workers: Vec::new(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_address: socket([0, 0, 0, 0], 8001),
            plugin_dir: PathBuf::from("scrapers"),
            reload: ReloadPolicy::default(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: socket([127, 0, 0, 1], 5000),
            admin_secret: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enable_cors: false,
            enable_request_logging: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

// ============================================================================
// Loading and Validation
// ============================================================================

impl Config {
    /// Load from `path` (or defaults), apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override selected keys from `SCRAPEGATE_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SCRAPEGATE_LICENSE_URL") {
            self.dispatcher.license_url = url;
        }
        if let Some(path) = lookup("SCRAPEGATE_DATABASE_PATH") {
            self.license_server.database_path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("SCRAPEGATE_ADMIN_SECRET") {
            self.admin.admin_secret = Some(secret);
        }
        if let Some(level) = lookup("SCRAPEGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SCRAPEGATE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let dispatcher = &self.dispatcher;

        for (name, value) in [
            ("cpu_threshold", dispatcher.cpu_threshold),
            ("memory_threshold", dispatcher.memory_threshold),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                anyhow::bail!("{name} must be in (0, 100], got {value}");
            }
        }

        for (name, value) in [
            ("license_timeout_secs", dispatcher.license_timeout_secs),
            ("job_timeout_secs", dispatcher.job_timeout_secs),
            ("probe_timeout_secs", dispatcher.probe_timeout_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than 0");
            }
        }

        if let ReloadPolicy::Interval { secs: 0 } = self.worker.reload {
            anyhow::bail!("worker reload interval must be greater than 0");
        }

        url::Url::parse(&dispatcher.license_url)
            .with_context(|| format!("Invalid license_url: {}", dispatcher.license_url))?;

        let mut names = HashSet::new();
        for worker in &dispatcher.workers {
            if !names.insert(worker.name.as_str()) {
                anyhow::bail!("Duplicate worker name: {}", worker.name);
            }
            if worker.scrapers.is_empty() {
                anyhow::bail!("Worker {} has an empty scraper list", worker.name);
            }
        }

        if let Some(secret) = &self.admin.admin_secret {
            uuid::Uuid::parse_str(secret).context("admin_secret must be a UUID")?;
        }

        check_log_format(&self.logging.format)?;

        Ok(())
    }

    /// Replace the log format after loading, rejecting unknown formats
    pub fn set_log_format(&mut self, format: impl Into<String>) -> Result<()> {
        let format = format.into();
        check_log_format(&format)?;
        self.logging.format = format;
        Ok(())
    }

    /// Router thresholds and probe timeout
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig::builder()
            .cpu_threshold(self.dispatcher.cpu_threshold)
            .memory_threshold(self.dispatcher.memory_threshold)
            .probe_timeout(Duration::from_secs(self.dispatcher.probe_timeout_secs))
            .build()
    }

    #[must_use]
    pub fn license_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatcher.license_timeout_secs)
    }

    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatcher.job_timeout_secs)
    }
}

fn check_log_format(format: &str) -> Result<()> {
    if !matches!(format, "text" | "json") {
        anyhow::bail!("logging.format must be 'text' or 'json', got '{format}'");
    }
    Ok(())
}
