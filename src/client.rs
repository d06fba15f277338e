//! JSON-over-HTTP client shared by every outbound call
//!
//! The dispatcher talks to the license server and to workers, and the admin
//! API talks to both as well. All of those calls go through [`JsonClient`],
//! which classifies failures into [`ClientError`] without retrying: a failed
//! call surfaces immediately and retry is left to the caller.

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::api::ErrorResponse;

// ============================================================================
// JSON Client
// ============================================================================

/// Thin wrapper around `reqwest::Client` with a default timeout
#[derive(Debug, Clone)]
pub struct JsonClient {
    http_client: Client,
    timeout: Duration,
}

impl JsonClient {
    /// Create a client whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .user_agent(concat!("scrapegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// GET `url` and decode a JSON body
    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R, ClientError> {
        self.get_json_with_timeout(url, self.timeout).await
    }

    /// GET with an explicit timeout
    pub async fn get_json_with_timeout<R: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<R, ClientError> {
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        Self::decode(response).await
    }

    /// POST a JSON body to `url` and decode a JSON response
    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<R, ClientError> {
        self.post_json_with_timeout(url, body, self.timeout).await
    }

    /// POST with an explicit timeout
    pub async fn post_json_with_timeout<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<R, ClientError> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ClientError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| ClientError::ParseError(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        Err(ClientError::HttpError {
            status: status.as_u16(),
            message: extract_detail(&text),
        })
    }
}

/// Pull the human-readable message out of an error body
///
/// Understands `{"detail": ..}` and `{"error": ..}`; anything else is
/// returned as-is.
pub fn extract_detail(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        return parsed.detail;
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(serde_json::Value::String(message)) = map.get("error") {
            return message.clone();
        }
    }

    body.trim().to_string()
}

// ============================================================================
// Client Errors
// ============================================================================

/// Outbound HTTP failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Client construction failed
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Connection refused, DNS failure, reset, ...
    #[error("Network error: {0}")]
    NetworkError(String),

    /// No response within the timeout
    #[error("Request timed out")]
    Timeout,

    /// Non-success status code
    #[error("HTTP error ({status}): {message}")]
    HttpError { status: u16, message: String },

    /// Response body did not decode
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ClientError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::NetworkError(err.to_string())
        }
    }

    /// Whether the peer could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::Timeout)
    }
}

// ============================================================================
// Tests
// ============================================================================
