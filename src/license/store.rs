//! License persistence
//!
//! The [`LicenseStore`] trait decouples the registry from its backing store.
//! [`SqliteLicenseStore`] is the production implementation; every operation
//! runs under a single connection mutex and inside one SQLite transaction, so
//! a validation's check-then-increment can never interleave with another
//! validation or with the monthly reset.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::{License, LicenseError, NewLicense};
use crate::models::ScraperSet;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage operations backing the license registry
///
/// Implementations must make `validate` atomic per key: the expiry and quota
/// checks and the usage increment happen as one unit.
pub trait LicenseStore: Send + Sync {
    /// Check the license as of `today` and consume one unit of quota
    fn validate(&self, key: &str, today: NaiveDate) -> Result<ScraperSet, LicenseError>;

    /// Insert a new license with zero usage
    fn create(&self, license: &NewLicense) -> Result<License, LicenseError>;

    /// Remove a license
    fn delete(&self, key: &str) -> Result<(), LicenseError>;

    /// All licenses ordered by key
    fn list(&self) -> Result<Vec<License>, LicenseError>;

    /// Zero every license's usage count, returning the number of rows touched
    fn reset_usage(&self) -> Result<usize, LicenseError>;
}

/// SQLite implementation of [`LicenseStore`]
pub struct SqliteLicenseStore {
    conn: Mutex<Connection>,
}

impl SqliteLicenseStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LicenseError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LicenseError::Storage(format!(
                        "failed to create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "License store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, LicenseError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), LicenseError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS licenses (
                    key TEXT PRIMARY KEY,
                    valid_until TEXT NOT NULL,
                    scrapers TEXT NOT NULL,
                    usage_per_month INTEGER NOT NULL,
                    usage_count INTEGER NOT NULL DEFAULT 0
                );
                "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LicenseError> {
        self.conn
            .lock()
            .map_err(|_| LicenseError::Storage("license store lock poisoned".to_string()))
    }
}

/// Scraper sets are stored as a JSON array so names survive unchanged
fn encode_scrapers(scrapers: &ScraperSet) -> Result<String, LicenseError> {
    serde_json::to_string(scrapers)
        .map_err(|e| LicenseError::Storage(format!("failed to encode scrapers: {e}")))
}

fn decode_scrapers(value: &str) -> Result<ScraperSet, LicenseError> {
    serde_json::from_str(value)
        .map_err(|e| LicenseError::Storage(format!("corrupt scrapers '{value}': {e}")))
}

fn parse_stored_date(value: &str) -> Result<NaiveDate, LicenseError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| LicenseError::Storage(format!("corrupt valid_until '{value}': {e}")))
}

impl LicenseStore for SqliteLicenseStore {
    fn validate(&self, key: &str, today: NaiveDate) -> Result<ScraperSet, LicenseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let row: Option<(String, String, i64, i64)> = tx
            .query_row(
                "SELECT valid_until, scrapers, usage_per_month, usage_count
                 FROM licenses WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((valid_until, scrapers, usage_per_month, usage_count)) = row else {
            return Err(LicenseError::NotFound);
        };

        if today > parse_stored_date(&valid_until)? {
            return Err(LicenseError::Expired);
        }

        if usage_count >= usage_per_month {
            return Err(LicenseError::QuotaExceeded);
        }

        let scrapers = decode_scrapers(&scrapers)?;

        tx.execute(
            "UPDATE licenses SET usage_count = usage_count + 1
             WHERE key = ?1 AND usage_count < usage_per_month",
            params![key],
        )?;
        tx.commit()?;

        Ok(scrapers)
    }

    fn create(&self, license: &NewLicense) -> Result<License, LicenseError> {
        let scrapers = encode_scrapers(&license.scrapers)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM licenses WHERE key = ?1)",
            params![license.key],
            |row| row.get(0),
        )?;
        if exists {
            return Err(LicenseError::AlreadyExists);
        }

        tx.execute(
            "INSERT INTO licenses (key, valid_until, scrapers, usage_per_month, usage_count)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                license.key,
                license.valid_until.format(DATE_FORMAT).to_string(),
                scrapers,
                license.usage_per_month,
            ],
        )?;
        tx.commit()?;

        Ok(License {
            key: license.key.clone(),
            valid_until: license.valid_until,
            scrapers: license.scrapers.clone(),
            usage_per_month: license.usage_per_month,
            usage_count: 0,
        })
    }

    fn delete(&self, key: &str) -> Result<(), LicenseError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM licenses WHERE key = ?1", params![key])?;
        if removed == 0 {
            return Err(LicenseError::NotFound);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<License>, LicenseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, valid_until, scrapers, usage_per_month, usage_count
             FROM licenses ORDER BY key",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, valid_until, scrapers, usage_per_month, usage_count)| {
                Ok(License {
                    key,
                    valid_until: parse_stored_date(&valid_until)?,
                    scrapers: decode_scrapers(&scrapers)?,
                    usage_per_month,
                    usage_count,
                })
            })
            .collect()
    }

    fn reset_usage(&self) -> Result<usize, LicenseError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rows = tx.execute("UPDATE licenses SET usage_count = 0", [])?;
        tx.commit()?;
        Ok(rows)
    }
}
