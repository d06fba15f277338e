//! Worker load probes
//!
//! A probe asks one worker for its current load. Probes never fail: any
//! problem is reported as a [`LoadReport`] variant that the router treats as
//! "fully loaded".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{ClientError, JsonClient};
use crate::metrics;
use crate::models::WorkerDescriptor;

/// Load assumed for a worker that cannot report one
pub const SATURATED_LOAD: f64 = 100.0;

/// Body of a worker's `GET /load`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadResponse {
    pub load: f64,
}

/// Outcome of probing one worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadReport {
    /// Worker answered with a load percentage
    Load(f64),

    /// Worker answered with a non-success status or an unusable body
    Error,

    /// Worker could not be reached within the timeout
    Unreachable,
}

impl LoadReport {
    /// Load used for ranking: reported value clamped to [0, 100], or the
    /// saturated sentinel for failures
    pub fn effective_load(&self) -> f64 {
        match self {
            Self::Load(load) if load.is_finite() => load.clamp(0.0, SATURATED_LOAD),
            _ => SATURATED_LOAD,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Load(_) => "ok",
            Self::Error => "error",
            Self::Unreachable => "unreachable",
        }
    }
}

/// Source of worker load samples
#[async_trait]
pub trait LoadProbe: Send + Sync {
    async fn probe(&self, worker: &WorkerDescriptor) -> LoadReport;
}

/// Probe that calls `GET {worker}/load`
pub struct HttpLoadProbe {
    client: JsonClient,
}

impl HttpLoadProbe {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: JsonClient::new(timeout)?,
        })
    }
}

#[async_trait]
impl LoadProbe for HttpLoadProbe {
    async fn probe(&self, worker: &WorkerDescriptor) -> LoadReport {
        let url = format!("{}/load", worker.base_url());

        let report = match self.client.get_json::<LoadResponse>(&url).await {
            Ok(body) => {
                tracing::debug!(worker = %worker.name, load = body.load, "Worker load");
                LoadReport::Load(body.load)
            }
            Err(e) if e.is_unreachable() => {
                tracing::warn!(worker = %worker.name, error = %e, "Failed to get load from worker");
                LoadReport::Unreachable
            }
            Err(e) => {
                tracing::warn!(worker = %worker.name, error = %e, "Worker returned an unusable load response");
                LoadReport::Error
            }
        };

        metrics::record_load_probe(report.label());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_load() {
        assert_eq!(LoadReport::Load(42.5).effective_load(), 42.5);
        assert_eq!(LoadReport::Load(150.0).effective_load(), 100.0);
        assert_eq!(LoadReport::Load(-3.0).effective_load(), 0.0);
        assert_eq!(LoadReport::Load(f64::NAN).effective_load(), SATURATED_LOAD);
        assert_eq!(LoadReport::Error.effective_load(), SATURATED_LOAD);
        assert_eq!(LoadReport::Unreachable.effective_load(), SATURATED_LOAD);
    }

    #[tokio::test]
    async fn test_http_probe_unreachable_worker() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let probe = HttpLoadProbe::new(Duration::from_millis(500)).unwrap();
        let worker = WorkerDescriptor::new("dead", "127.0.0.1", 9, crate::models::ScraperSet::new(["all"]));

        let report = probe.probe(&worker).await;
        assert_eq!(report.effective_load(), SATURATED_LOAD);
    }
}
