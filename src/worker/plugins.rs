//! Scraper plugin registry
//!
//! Keeps the table of runnable handlers for one worker, rebuilt from the
//! definition files in a directory. Reloads replace entries one at a time, so
//! a concurrent lookup sees either the old or the new handler for a name,
//! never a partial one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::definition::ScraperDefinition;
use super::handler::{ScraperHandler, SelectorScraper};
use super::PluginError;
use crate::error::ScrapegateErrorTrait;
use crate::metrics;

/// File extension of scraper definitions
pub const DEFINITION_EXTENSION: &str = "toml";

// ============================================================================
// Reload Policy
// ============================================================================

/// When the registry rescans its directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Rescan before every lookup
    #[default]
    OnLookup,

    /// Rescan from a background task every `secs` seconds
    Interval { secs: u64 },

    /// Rescan only when [`PluginRegistry::reload`] is called
    Manual,
}

impl ReloadPolicy {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Interval { secs } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Outcome of one directory scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
    pub removed: Vec<String>,
}

// ============================================================================
// Plugin Registry
// ============================================================================

pub struct PluginRegistry {
    dir: PathBuf,
    policy: ReloadPolicy,
    client: reqwest::Client,
    handlers: RwLock<HashMap<String, Arc<dyn ScraperHandler>>>,
    errors: RwLock<BTreeMap<String, String>>,
}

impl PluginRegistry {
    /// Create an empty registry over `dir`; nothing is loaded until the first
    /// reload or lookup
    pub fn new(dir: impl Into<PathBuf>, policy: ReloadPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
            client: reqwest::Client::new(),
            handlers: RwLock::new(HashMap::new()),
            errors: RwLock::new(BTreeMap::new()),
        }
    }

    /// Share one HTTP client between every handler this registry builds
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// Look up a handler by scraper name
    ///
    /// Under [`ReloadPolicy::OnLookup`] the directory is rescanned first.
    /// Returns `None` when the scraper is unknown or its definition failed to
    /// load.
    pub async fn get(&self, scraper_name: &str) -> Option<Arc<dyn ScraperHandler>> {
        if self.policy == ReloadPolicy::OnLookup {
            if let Err(e) = self.reload().await {
                tracing::error!(error = %e, "Plugin reload failed; serving the current table");
            }
        }

        self.handlers.read().await.get(scraper_name).cloned()
    }

    /// Names of the currently loaded handlers, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Last load error per scraper name
    pub async fn load_errors(&self) -> BTreeMap<String, String> {
        self.errors.read().await.clone()
    }

    /// Rescan the directory and rebuild every handler from disk
    ///
    /// Individual load failures are recorded, not returned; only a failure to
    /// read the directory itself is an error, in which case the table is left
    /// unchanged.
    pub async fn reload(&self) -> Result<ReloadSummary, PluginError> {
        let files = scan_definitions(&self.dir).await?;

        let mut outcomes = Vec::with_capacity(files.len());
        for (name, path) in &files {
            let outcome = self.load_one(name, path).await;
            outcomes.push((name.clone(), outcome));
        }

        let present: HashSet<&String> = files.iter().map(|(name, _)| name).collect();
        let mut summary = ReloadSummary::default();

        {
            let mut handlers = self.handlers.write().await;
            let mut errors = self.errors.write().await;

            for (name, outcome) in outcomes {
                match outcome {
                    Ok(handler) => {
                        handlers.insert(name.clone(), handler);
                        errors.remove(&name);
                        summary.loaded.push(name);
                    }
                    Err(e) => {
                        tracing::error!(
                            scraper = %name,
                            category = e.category().as_str(),
                            error = %e,
                            "Failed to load scraper"
                        );
                        handlers.remove(&name);
                        errors.insert(name.clone(), e.to_string());
                        summary.failed.push(name);
                    }
                }
            }

            handlers.retain(|name, _| {
                let keep = present.contains(name);
                if !keep {
                    summary.removed.push(name.clone());
                }
                keep
            });
            errors.retain(|name, _| present.contains(name));
        }

        for name in &summary.removed {
            tracing::info!(scraper = %name, "Scraper definition removed");
        }
        tracing::debug!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            removed = summary.removed.len(),
            "Plugins reloaded"
        );

        Ok(summary)
    }

    async fn load_one(&self, name: &str, path: &Path) -> Result<Arc<dyn ScraperHandler>, PluginError> {
        let result = async {
            let source = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| PluginError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            let definition = ScraperDefinition::from_toml_str(name, &source)?;
            let handler = SelectorScraper::compile(name, definition, self.client.clone())?;
            Ok::<Arc<dyn ScraperHandler>, PluginError>(Arc::new(handler))
        }
        .await;

        metrics::record_plugin_load(if result.is_ok() { "loaded" } else { "failed" });
        result
    }

    /// Start the background reload loop for [`ReloadPolicy::Interval`]
    ///
    /// Returns `None` for the other policies.
    pub fn spawn_reloader(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.policy.interval()?;
        let registry = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.reload().await {
                    tracing::error!(error = %e, "Scheduled plugin reload failed");
                }
            }
        }))
    }
}

/// List `(scraper name, path)` for every definition file in `dir`, sorted by
/// name
async fn scan_definitions(dir: &Path) -> Result<Vec<(String, PathBuf)>, PluginError> {
    let scan_error = |e: std::io::Error| PluginError::Scan {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(scan_error)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DEFINITION_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.is_empty() || stem.starts_with('_') || stem.starts_with('.') {
            continue;
        }
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        files.push((stem.to_string(), path));
    }

    files.sort();
    Ok(files)
}
