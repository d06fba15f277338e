// Core data structures shared by the license server, dispatcher and workers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard entry granting access to every scraper
pub const ALL_SCRAPERS: &str = "all";

/// Set of scraper names a license or worker is allowed to run
///
/// Insertion order is preserved so that values round-trip unchanged through
/// storage and the HTTP API. Names are opaque: no character is reserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScraperSet(Vec<String>);

impl ScraperSet {
    /// Create from a list of names, dropping blanks and duplicates
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: Vec<String> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if !name.is_empty() && !set.contains(&name) {
                set.push(name);
            }
        }
        Self(set)
    }

    /// Whether `scraper_name` is permitted by this set
    pub fn allows(&self, scraper_name: &str) -> bool {
        self.0
            .iter()
            .any(|s| s == ALL_SCRAPERS || s == scraper_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScraperSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Statically configured worker ("scraper server")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// Unique worker name
    pub name: String,

    /// Host or IP address the worker listens on
    pub ip: String,

    /// Port the worker listens on
    pub port: u16,

    /// Scrapers this worker can run (or `["all"]`)
    pub scrapers: ScraperSet,
}

impl WorkerDescriptor {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16, scrapers: ScraperSet) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            scrapers,
        }
    }

    /// Base URL for HTTP calls to this worker
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    /// Whether this worker is eligible to run `scraper_name`
    pub fn can_run(&self, scraper_name: &str) -> bool {
        self.scrapers.allows(scraper_name)
    }
}

/// Job parameters passed through to a scraper handler
pub type JobParams = serde_json::Map<String, serde_json::Value>;

/// Body of a worker's `POST /scrape`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub scraper_name: String,

    #[serde(default)]
    pub params: JobParams,
}

/// Successful job result, returned by workers and relayed by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub status: String,
    pub data: JobParams,
}

impl ScrapeResponse {
    pub fn success(data: JobParams) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}
