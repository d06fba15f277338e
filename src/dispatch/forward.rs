//! Forwarding jobs to workers over HTTP

use std::time::Duration;

use async_trait::async_trait;

use super::{DispatchError, JobForwarder, WorkerFailure};
use crate::client::{ClientError, JsonClient};
use crate::models::{JobParams, ScrapeRequest, ScrapeResponse, WorkerDescriptor};

/// Default time a worker has to finish a job
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls `POST {worker}/scrape`
pub struct HttpJobForwarder {
    client: JsonClient,
}

impl HttpJobForwarder {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: JsonClient::new(timeout)?,
        })
    }
}

#[async_trait]
impl JobForwarder for HttpJobForwarder {
    async fn forward(
        &self,
        worker: &WorkerDescriptor,
        request: &ScrapeRequest,
    ) -> Result<JobParams, DispatchError> {
        let url = format!("{}/scrape", worker.base_url());
        tracing::debug!(worker = %worker.name, scraper = %request.scraper_name, "Forwarding job");

        match self.client.post_json::<_, ScrapeResponse>(&url, request).await {
            Ok(response) => Ok(response.data),
            Err(e) => {
                let reason = if e.is_unreachable() {
                    WorkerFailure::Unreachable(e.to_string())
                } else {
                    WorkerFailure::Failed(e.to_string())
                };
                tracing::error!(worker = %worker.name, error = %e, "Scraper server returned error");
                Err(DispatchError::WorkerExecutionFailed {
                    worker: worker.name.clone(),
                    reason,
                })
            }
        }
    }
}
