//! Runnable scraper handlers
//!
//! A handler takes the job parameters and returns a JSON object. The only
//! production implementation is [`SelectorScraper`], built from a
//! [`ScraperDefinition`](super::definition::ScraperDefinition).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::definition::{ScraperDefinition, UrlTemplate};
use super::{PluginError, ScrapeError};
use crate::models::JobParams;

/// A named job handler loaded by the plugin registry
#[async_trait]
pub trait ScraperHandler: Send + Sync {
    /// Scraper name the handler is registered under
    fn name(&self) -> &str;

    /// Execute one job
    async fn run(&self, params: &JobParams) -> Result<JobParams, ScrapeError>;
}

// ============================================================================
// Selector Scraper
// ============================================================================

#[derive(Debug)]
struct CompiledField {
    name: String,
    selector: Selector,
    attr: Option<String>,
    all: bool,
}

/// Fetches a templated URL and extracts CSS-selector fields
#[derive(Debug)]
pub struct SelectorScraper {
    name: String,
    template: UrlTemplate,
    fields: Vec<CompiledField>,
    headers: HeaderMap,
    timeout: Duration,
    client: reqwest::Client,
}

impl SelectorScraper {
    /// Compile a definition; bad templates, selectors, or headers are load errors
    pub fn compile(
        name: impl Into<String>,
        definition: ScraperDefinition,
        client: reqwest::Client,
    ) -> Result<Self, PluginError> {
        let name = name.into();
        let invalid = |reason: String| PluginError::InvalidDefinition {
            name: name.clone(),
            reason,
        };

        let template = UrlTemplate::parse(&definition.url).map_err(&invalid)?;

        let mut fields = Vec::with_capacity(definition.fields.len());
        for (field_name, spec) in definition.fields {
            if field_name == "url" {
                return Err(invalid("field name 'url' is reserved".to_string()));
            }
            let selector = Selector::parse(&spec.selector)
                .map_err(|e| invalid(format!("field '{field_name}': bad selector: {e:?}")))?;
            fields.push(CompiledField {
                name: field_name,
                selector,
                attr: spec.attr,
                all: spec.all,
            });
        }

        let mut headers = HeaderMap::new();
        for (key, value) in &definition.headers {
            let header_name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| invalid(format!("header '{key}': {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("header '{key}': {e}")))?;
            headers.insert(header_name, header_value);
        }
        if let Some(user_agent) = &definition.user_agent {
            let value = HeaderValue::from_str(user_agent)
                .map_err(|e| invalid(format!("user_agent: {e}")))?;
            headers.insert(USER_AGENT, value);
        }

        Ok(Self {
            name,
            template,
            fields,
            headers,
            timeout: Duration::from_secs(definition.timeout_secs),
            client,
        })
    }

    /// Extract the configured fields from an HTML document
    pub fn extract(&self, html: &str, final_url: &str) -> JobParams {
        let document = Html::parse_document(html);

        let mut output = JobParams::new();
        output.insert("url".to_string(), Value::String(final_url.to_string()));

        for field in &self.fields {
            let mut matches = document
                .select(&field.selector)
                .filter_map(|element| field_value(element, field.attr.as_deref()));

            let value = if field.all {
                Value::Array(matches.map(Value::String).collect())
            } else {
                matches.next().map(Value::String).unwrap_or(Value::Null)
            };
            output.insert(field.name.clone(), value);
        }

        output
    }
}

fn field_value(element: ElementRef<'_>, attr: Option<&str>) -> Option<String> {
    match attr {
        Some(attr) => element.value().attr(attr).map(|v| v.trim().to_string()),
        None => Some(
            element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

#[async_trait]
impl ScraperHandler for SelectorScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, params: &JobParams) -> Result<JobParams, ScrapeError> {
        let url = self.template.render(params)?;
        tracing::debug!(scraper = %self.name, url = %url, "Fetching target page");

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ScrapeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::Request(e.to_string()))?;

        // `Html` is not Send, so parsing stays out of the awaited section.
        Ok(self.extract(&body, &final_url))
    }
}
