//! Declarative scraper definitions
//!
//! Each file in the plugin directory describes one scraper: a URL template
//! filled from the job parameters and a set of CSS-selector fields extracted
//! from the fetched page.
//!
//! ```toml
//! description = "Product detail page"
//! url = "https://shop.example/items/{item_id}"
//! timeout_secs = 20
//!
//! [headers]
//! Accept-Language = "en"
//!
//! [fields.title]
//! selector = "h1.title"
//!
//! [fields.images]
//! selector = "img.gallery"
//! attr = "src"
//! all = true
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PluginError, ScrapeError};
use crate::models::JobParams;

fn default_timeout_secs() -> u64 {
    30
}

/// Parsed contents of a scraper definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScraperDefinition {
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,

    /// URL template with `{param}` placeholders
    pub url: String,

    /// Request timeout for the target fetch
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Output fields keyed by name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

/// How to extract one output field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// CSS selector
    pub selector: String,

    /// Attribute to read instead of the element text
    #[serde(default)]
    pub attr: Option<String>,

    /// Collect every match into an array instead of taking the first
    #[serde(default)]
    pub all: bool,
}

impl ScraperDefinition {
    /// Parse TOML source for the scraper called `name`
    pub fn from_toml_str(name: &str, source: &str) -> Result<Self, PluginError> {
        let definition: Self = toml::from_str(source).map_err(|e| PluginError::InvalidDefinition {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        if definition.timeout_secs == 0 {
            return Err(PluginError::InvalidDefinition {
                name: name.to_string(),
                reason: "timeout_secs must be greater than 0".to_string(),
            });
        }

        Ok(definition)
    }
}

// ============================================================================
// URL Template
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// URL with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Parse a template; placeholders are `[A-Za-z0-9_]+` inside braces
    pub fn parse(template: &str) -> Result<Self, String> {
        if !(template.starts_with("http://") || template.starts_with("https://")) {
            return Err(format!("url must start with http:// or https://: {template}"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' => name.push(ch),
                            Some(ch) => {
                                return Err(format!("invalid character '{ch}' in placeholder"))
                            }
                            None => return Err("unclosed placeholder".to_string()),
                        }
                    }
                    if name.is_empty() {
                        return Err("empty placeholder".to_string());
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param(name));
                }
                '}' => return Err("unmatched '}'".to_string()),
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in order of appearance
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute placeholders from `params`
    ///
    /// String values are inserted as-is, other JSON values by their JSON text;
    /// both are form-urlencoded.
    pub fn render(&self, params: &JobParams) -> Result<url::Url, ScrapeError> {
        let mut rendered = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Param(name) => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| ScrapeError::MissingParameter(name.clone()))?;
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    rendered.extend(url::form_urlencoded::byte_serialize(text.as_bytes()));
                }
            }
        }

        url::Url::parse(&rendered).map_err(|e| ScrapeError::InvalidUrl(format!("{rendered}: {e}")))
    }
}
