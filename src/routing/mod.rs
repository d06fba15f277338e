//! Load-aware worker selection
//!
//! Given a scraper name and the configured workers, the router keeps the
//! workers able to run that scraper, probes their load concurrently, and
//! picks the least-loaded one that is below the configured thresholds.
//!
//! Selection is a point-in-time snapshot: nothing is reserved, so two
//! concurrent selections may choose the same worker.

pub mod probe;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;

use crate::models::WorkerDescriptor;

pub use probe::{HttpLoadProbe, LoadProbe, LoadReport, LoadResponse, SATURATED_LOAD};

/// Default CPU and memory threshold (percent)
pub const DEFAULT_THRESHOLD: f64 = 80.0;

/// Default per-worker probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Router Configuration
// ============================================================================

/// Thresholds and timeouts for worker selection
///
/// Workers report one combined load value, which is compared against both
/// thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterConfig {
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub probe_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: DEFAULT_THRESHOLD,
            memory_threshold: DEFAULT_THRESHOLD,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl RouterConfig {
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// Whether a worker at `load` may take a job
    pub fn accepts(&self, load: f64) -> bool {
        load < self.cpu_threshold && load < self.memory_threshold
    }
}

/// Builder for RouterConfig
#[derive(Debug, Default)]
pub struct RouterConfigBuilder {
    cpu_threshold: Option<f64>,
    memory_threshold: Option<f64>,
    probe_timeout: Option<Duration>,
}

impl RouterConfigBuilder {
    pub fn cpu_threshold(mut self, threshold: f64) -> Self {
        self.cpu_threshold = Some(threshold);
        self
    }

    pub fn memory_threshold(mut self, threshold: f64) -> Self {
        self.memory_threshold = Some(threshold);
        self
    }

    /// Set both thresholds
    pub fn threshold(self, threshold: f64) -> Self {
        self.cpu_threshold(threshold).memory_threshold(threshold)
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RouterConfig {
        RouterConfig {
            cpu_threshold: self.cpu_threshold.unwrap_or(DEFAULT_THRESHOLD),
            memory_threshold: self.memory_threshold.unwrap_or(DEFAULT_THRESHOLD),
            probe_timeout: self.probe_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why no worker was selected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// No configured worker can run the scraper
    #[error("No scraper servers available for this scraper")]
    NoEligibleWorkers,

    /// Every eligible worker is at or above the load threshold
    #[error("No scraper servers available below load thresholds")]
    AllWorkersSaturated,
}

// ============================================================================
// Load Router
// ============================================================================

/// Picks a worker for a scraper based on live load
#[derive(Clone)]
pub struct LoadRouter {
    config: RouterConfig,
    probe: Arc<dyn LoadProbe>,
}

impl LoadRouter {
    pub fn new(config: RouterConfig, probe: Arc<dyn LoadProbe>) -> Self {
        Self { config, probe }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Select the least-loaded eligible worker below the thresholds
    ///
    /// Ties keep the order of `candidates`.
    pub async fn select(
        &self,
        scraper_name: &str,
        candidates: &[WorkerDescriptor],
    ) -> Result<WorkerDescriptor, RouteError> {
        let eligible: Vec<&WorkerDescriptor> = candidates
            .iter()
            .filter(|w| w.can_run(scraper_name))
            .collect();

        if eligible.is_empty() {
            tracing::warn!(scraper = %scraper_name, "No eligible workers found for scraper");
            return Err(RouteError::NoEligibleWorkers);
        }

        let reports = self.probe_each(&eligible).await;
        let mut ranked: Vec<(&WorkerDescriptor, f64)> = eligible
            .into_iter()
            .zip(reports.iter().map(LoadReport::effective_load))
            .collect();

        // `sort_by` is stable, which keeps ties in candidate order.
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (worker, load) in ranked {
            if self.config.accepts(load) {
                tracing::info!(worker = %worker.name, load, scraper = %scraper_name, "Selected worker");
                return Ok(worker.clone());
            }
        }

        tracing::warn!(
            scraper = %scraper_name,
            cpu_threshold = self.config.cpu_threshold,
            memory_threshold = self.config.memory_threshold,
            "No workers available below load thresholds"
        );
        Err(RouteError::AllWorkersSaturated)
    }

    /// Probe every worker, preserving input order
    pub async fn probe_all(
        &self,
        workers: &[WorkerDescriptor],
    ) -> Vec<(WorkerDescriptor, LoadReport)> {
        let refs: Vec<&WorkerDescriptor> = workers.iter().collect();
        let reports = self.probe_each(&refs).await;
        workers.iter().cloned().zip(reports).collect()
    }

    /// Concurrent probes, each independently bounded by the probe timeout
    async fn probe_each(&self, workers: &[&WorkerDescriptor]) -> Vec<LoadReport> {
        let timeout = self.config.probe_timeout;

        join_all(workers.iter().map(|worker| async move {
            match tokio::time::timeout(timeout, self.probe.probe(worker)).await {
                Ok(report) => report,
                Err(_) => {
                    tracing::warn!(worker = %worker.name, "Load probe timed out");
                    LoadReport::Unreachable
                }
            }
        }))
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================
