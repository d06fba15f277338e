//! License registry
//!
//! Owns license records, enforces expiry and monthly quota, and resets usage
//! at every calendar-month boundary (UTC).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │            License Server            │
//! │                                      │
//! │  ┌────────────────────────────────┐  │
//! │  │ REST API                       │  │
//! │  │  POST /validate                │  │
//! │  │  POST /create_license          │  │
//! │  │  POST /delete_license          │  │
//! │  │  GET  /list_licenses           │  │
//! │  └───────────────┬────────────────┘  │
//! │                  ▼                   │
//! │  ┌────────────────────────────────┐  │
//! │  │ LicenseRegistry                │◄─┼── MonthlyReset
//! │  └───────────────┬────────────────┘  │
//! │                  ▼                   │
//! │  ┌────────────────────────────────┐  │
//! │  │ LicenseStore (SQLite)          │  │
//! │  └────────────────────────────────┘  │
//! └──────────────────────────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod reset;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ScrapegateErrorTrait;
use crate::metrics;
use crate::models::ScraperSet;

pub use client::LicenseClient;
pub use reset::{next_month_boundary, Clock, MonthlyReset};
pub use store::{LicenseStore, SqliteLicenseStore};

// ============================================================================
// Types
// ============================================================================

/// A stored license record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub key: String,

    /// Last day (inclusive, UTC) on which the license validates
    pub valid_until: NaiveDate,

    pub scrapers: ScraperSet,
    pub usage_per_month: u32,
    pub usage_count: u32,
}

/// Data required to create a license
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLicense {
    pub key: String,
    pub valid_until: NaiveDate,
    pub scrapers: ScraperSet,
    pub usage_per_month: u32,
}

impl NewLicense {
    /// Build from the raw API fields, parsing `valid_until`
    pub fn parse(
        key: impl Into<String>,
        valid_until: &str,
        scrapers: ScraperSet,
        usage_per_month: u32,
    ) -> Result<Self, LicenseError> {
        Ok(Self {
            key: key.into(),
            valid_until: parse_valid_until(valid_until)?,
            scrapers,
            usage_per_month,
        })
    }
}

/// Parse an ISO date, or the date part of an ISO datetime
pub fn parse_valid_until(value: &str) -> Result<NaiveDate, LicenseError> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(datetime.date());
        }
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| LicenseError::InvalidDate(value.to_string()))
}

// ============================================================================
// Errors
// ============================================================================

/// License registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LicenseError {
    #[error("License key not found")]
    NotFound,

    #[error("License key already exists")]
    AlreadyExists,

    #[error("License expired")]
    Expired,

    #[error("License usage limit reached")]
    QuotaExceeded,

    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("License store error: {0}")]
    Storage(String),
}

impl LicenseError {
    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Expired => "expired",
            Self::QuotaExceeded => "quota_exceeded",
            Self::InvalidDate(_) => "invalid_date",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<rusqlite::Error> for LicenseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

// ============================================================================
// License Registry
// ============================================================================

/// Async facade over a [`LicenseStore`]
///
/// Store calls are synchronous, so each one runs on the blocking pool.
#[derive(Clone)]
pub struct LicenseRegistry {
    store: Arc<dyn LicenseStore>,
}

impl LicenseRegistry {
    pub fn new(store: Arc<dyn LicenseStore>) -> Self {
        Self { store }
    }

    /// Registry backed by a SQLite file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LicenseError> {
        Ok(Self::new(Arc::new(SqliteLicenseStore::open(path)?)))
    }

    /// Registry backed by an in-memory SQLite database
    pub fn in_memory() -> Result<Self, LicenseError> {
        Ok(Self::new(Arc::new(SqliteLicenseStore::in_memory()?)))
    }

    /// Validate `key` against today's UTC date and consume one unit of quota
    pub async fn validate(&self, key: &str) -> Result<ScraperSet, LicenseError> {
        self.validate_on(key, Utc::now().date_naive()).await
    }

    /// Validate `key` as of `today`
    pub async fn validate_on(
        &self,
        key: &str,
        today: NaiveDate,
    ) -> Result<ScraperSet, LicenseError> {
        let owned_key = key.to_string();
        let result = self
            .blocking(move |store| store.validate(&owned_key, today))
            .await;

        match &result {
            Ok(scrapers) => {
                metrics::record_license_validation("valid");
                tracing::info!(key = %key, scrapers = %scrapers, "License validated");
            }
            Err(e) => {
                metrics::record_license_validation(e.label());
                tracing::warn!(
                    key = %key,
                    category = e.category().as_str(),
                    reason = %e,
                    "License validation failed"
                );
            }
        }

        result
    }

    pub async fn create(&self, license: NewLicense) -> Result<License, LicenseError> {
        let key = license.key.clone();
        let result = self.blocking(move |store| store.create(&license)).await;

        match &result {
            Ok(created) => tracing::info!(
                key = %key,
                valid_until = %created.valid_until,
                usage_per_month = created.usage_per_month,
                "License created"
            ),
            Err(e) => tracing::warn!(key = %key, reason = %e, "License creation failed"),
        }

        result
    }

    pub async fn delete(&self, key: &str) -> Result<(), LicenseError> {
        let owned_key = key.to_string();
        let result = self.blocking(move |store| store.delete(&owned_key)).await;

        match &result {
            Ok(()) => tracing::info!(key = %key, "License deleted"),
            Err(e) => tracing::warn!(key = %key, reason = %e, "License deletion failed"),
        }

        result
    }

    pub async fn list(&self) -> Result<Vec<License>, LicenseError> {
        self.blocking(|store| store.list()).await
    }

    /// Zero every usage count in one transaction
    pub async fn reset_usage(&self) -> Result<usize, LicenseError> {
        self.blocking(|store| store.reset_usage()).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, LicenseError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LicenseStore) -> Result<T, LicenseError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| LicenseError::Storage(format!("blocking task failed: {e}")))?
    }
}
