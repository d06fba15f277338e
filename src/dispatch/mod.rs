//! Dispatch coordinator
//!
//! Accepts a job from a licensed client and runs it on a worker:
//!
//! 1. validate the license (consuming one unit of quota)
//! 2. check the license authorizes the requested scraper
//! 3. pick the least-loaded eligible worker
//! 4. forward the job and relay the result
//!
//! Each step fails fast; nothing is retried on another worker.

pub mod api;
pub mod forward;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

use crate::error::ScrapegateErrorTrait;
use crate::metrics;
use crate::models::{JobParams, ScrapeRequest, ScraperSet, WorkerDescriptor};
use crate::routing::{LoadRouter, RouteError};

pub use forward::HttpJobForwarder;

// ============================================================================
// Errors
// ============================================================================

/// Why a forwarded job failed on the worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerFailure {
    /// Connection failure or timeout
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Worker answered with a non-success status or an unreadable body
    #[error("{0}")]
    Failed(String),
}

/// Dispatch failures, each with its own HTTP status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid license key: {0}")]
    InvalidLicense(String),

    #[error("License server unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Scraper not allowed for this license")]
    ScraperNotAuthorized,

    #[error(transparent)]
    NoWorkerAvailable(#[from] RouteError),

    #[error("Scraper server {worker} failed: {reason}")]
    WorkerExecutionFailed { worker: String, reason: WorkerFailure },
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidLicense(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ScraperNotAuthorized => StatusCode::FORBIDDEN,
            Self::NoWorkerAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::WorkerExecutionFailed {
                reason: WorkerFailure::Unreachable(_),
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            Self::WorkerExecutionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client
    ///
    /// Upstream and worker internals are logged, not exposed.
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidLicense(reason) => format!("Invalid license key: {reason}"),
            Self::UpstreamUnavailable(_) => "License server error".to_string(),
            Self::ScraperNotAuthorized | Self::NoWorkerAvailable(_) => self.to_string(),
            Self::WorkerExecutionFailed {
                reason: WorkerFailure::Unreachable(_),
                ..
            } => "Scraper server unreachable".to_string(),
            Self::WorkerExecutionFailed { .. } => "Scraper server error".to_string(),
        }
    }

    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidLicense(_) => "invalid_license",
            Self::UpstreamUnavailable(_) => "license_server_error",
            Self::ScraperNotAuthorized => "not_authorized",
            Self::NoWorkerAvailable(_) => "no_worker",
            Self::WorkerExecutionFailed { .. } => "worker_failed",
        }
    }
}

// ============================================================================
// Seams
// ============================================================================

/// Validates a license key and returns the scrapers it authorizes
#[async_trait]
pub trait LicenseValidator: Send + Sync {
    /// Fails with `InvalidLicense` or `UpstreamUnavailable`
    async fn validate(&self, license_key: &str) -> Result<ScraperSet, DispatchError>;
}

/// Sends a job to a worker and returns the worker's result mapping
#[async_trait]
pub trait JobForwarder: Send + Sync {
    /// Fails with `WorkerExecutionFailed`
    async fn forward(
        &self,
        worker: &WorkerDescriptor,
        request: &ScrapeRequest,
    ) -> Result<JobParams, DispatchError>;
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Runs the validate, select, forward pipeline for one job
#[derive(Clone)]
pub struct Dispatcher {
    validator: Arc<dyn LicenseValidator>,
    router: LoadRouter,
    forwarder: Arc<dyn JobForwarder>,
    workers: Arc<Vec<WorkerDescriptor>>,
}

impl Dispatcher {
    pub fn new(
        validator: Arc<dyn LicenseValidator>,
        router: LoadRouter,
        forwarder: Arc<dyn JobForwarder>,
        workers: Vec<WorkerDescriptor>,
    ) -> Self {
        Self {
            validator,
            router,
            forwarder,
            workers: Arc::new(workers),
        }
    }

    pub fn workers(&self) -> &[WorkerDescriptor] {
        &self.workers
    }

    /// Submit one job on behalf of `license_key`
    pub async fn submit(
        &self,
        license_key: &str,
        scraper_name: &str,
        params: JobParams,
    ) -> Result<JobParams, DispatchError> {
        let result = self.run(license_key, scraper_name, params).await;

        match &result {
            Ok(_) => metrics::record_dispatch("success"),
            Err(e) => {
                metrics::record_dispatch(e.label());
                tracing::warn!(
                    scraper = %scraper_name,
                    status = e.status_code().as_u16(),
                    category = e.category().as_str(),
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "Job dispatch failed"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        license_key: &str,
        scraper_name: &str,
        params: JobParams,
    ) -> Result<JobParams, DispatchError> {
        let allowed = self.validator.validate(license_key).await?;

        if !allowed.allows(scraper_name) {
            return Err(DispatchError::ScraperNotAuthorized);
        }

        let worker = self.router.select(scraper_name, &self.workers).await?;

        let request = ScrapeRequest {
            scraper_name: scraper_name.to_string(),
            params,
        };
        let data = self.forwarder.forward(&worker, &request).await?;

        tracing::info!(worker = %worker.name, scraper = %scraper_name, "Job completed");
        Ok(data)
    }
}

// ============================================================================
// Tests
// ============================================================================
