//! HTTP client for the license server
//!
//! Used by the dispatcher to validate keys and by the admin API to manage
//! licenses.

use std::time::Duration;

use async_trait::async_trait;

use super::api::{
    CreateLicenseRequest, DeleteLicenseRequest, LicenseListResponse, ValidateRequest,
    ValidateResponse,
};
use super::License;
use crate::api::StatusResponse;
use crate::client::{ClientError, JsonClient};
use crate::dispatch::{DispatchError, LicenseValidator};
use crate::error::ScrapegateErrorTrait;
use crate::models::ScraperSet;

/// Client for one license server
#[derive(Debug, Clone)]
pub struct LicenseClient {
    base_url: String,
    client: JsonClient,
}

impl LicenseClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            client: JsonClient::new(timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `POST /validate`
    pub async fn request_validation(&self, key: &str) -> Result<ValidateResponse, ClientError> {
        self.client
            .post_json(
                &self.endpoint("validate"),
                &ValidateRequest {
                    key: key.to_string(),
                },
            )
            .await
    }

    /// `GET /list_licenses`
    pub async fn list(&self) -> Result<Vec<License>, ClientError> {
        let response: LicenseListResponse = self.client.get_json(&self.endpoint("list_licenses")).await?;
        Ok(response.licenses)
    }

    /// `POST /create_license`
    pub async fn create(&self, request: &CreateLicenseRequest) -> Result<StatusResponse, ClientError> {
        self.client
            .post_json(&self.endpoint("create_license"), request)
            .await
    }

    /// `POST /delete_license`
    pub async fn delete(&self, key: &str) -> Result<StatusResponse, ClientError> {
        self.client
            .post_json(
                &self.endpoint("delete_license"),
                &DeleteLicenseRequest {
                    key: key.to_string(),
                },
            )
            .await
    }
}

#[async_trait]
impl LicenseValidator for LicenseClient {
    async fn validate(&self, license_key: &str) -> Result<ScraperSet, DispatchError> {
        match self.request_validation(license_key).await {
            Ok(response) if response.valid => Ok(response.scrapers),
            Ok(_) => Err(DispatchError::InvalidLicense(
                "license server reported the key invalid".to_string(),
            )),
            Err(ClientError::HttpError { status, message }) if (400..500).contains(&status) => {
                Err(DispatchError::InvalidLicense(message))
            }
            Err(e) => {
                tracing::error!(
                    category = e.category().as_str(),
                    error = %e,
                    url = %self.base_url,
                    "License server is unreachable"
                );
                Err(DispatchError::UpstreamUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_validate_maps_status_codes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/validate"))
            .and(body_json(serde_json::json!({"key": "good"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"valid": true, "scrapers": ["news"]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/validate"))
            .and(body_json(serde_json::json!({"key": "old"})))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"detail": "License expired"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/validate"))
            .and(body_json(serde_json::json!({"key": "boom"})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LicenseClient::new(server.uri(), Duration::from_secs(5)).unwrap();

        let scrapers = LicenseValidator::validate(&client, "good").await.unwrap();
        assert_eq!(scrapers, ScraperSet::new(["news"]));

        assert_eq!(
            LicenseValidator::validate(&client, "old").await,
            Err(DispatchError::InvalidLicense("License expired".to_string()))
        );
        assert!(matches!(
            LicenseValidator::validate(&client, "boom").await,
            Err(DispatchError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_license_server() {
        let client = LicenseClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            LicenseValidator::validate(&client, "any").await,
            Err(DispatchError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = LicenseClient::new("http://license:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint("validate"), "http://license:8000/validate");
    }
}
