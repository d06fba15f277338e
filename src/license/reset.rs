//! Monthly usage reset
//!
//! Sleeps until the first instant of the next calendar month (UTC), zeroes
//! every license's usage count, and repeats. The next boundary is always
//! derived from the wall clock, so a restarted process simply picks up the
//! upcoming boundary without any persisted state.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tokio::task::JoinHandle;

use super::LicenseRegistry;
use crate::metrics;

/// First instant of the calendar month following `now`
pub fn next_month_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        // Only unreachable at the far end of chrono's date range.
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time left until `boundary`, or zero once it has been reached
pub fn time_until(now: DateTime<Utc>, boundary: DateTime<Utc>) -> Duration {
    if now >= boundary {
        Duration::zero()
    } else {
        boundary - now
    }
}

/// Source of the current wall-clock time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Background task resetting usage counts at each month boundary
pub struct MonthlyReset {
    registry: LicenseRegistry,
    clock: Clock,
}

impl MonthlyReset {
    pub fn new(registry: LicenseRegistry) -> Self {
        Self::with_clock(registry, Arc::new(Utc::now))
    }

    /// Reset task reading the time from `clock` instead of the system
    pub fn with_clock(registry: LicenseRegistry, clock: Clock) -> Self {
        Self { registry, clock }
    }

    /// Spawn the reset loop onto the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Run forever
    pub async fn run(self) {
        loop {
            let now = (self.clock)();
            let boundary = next_month_boundary(now);
            tracing::info!(
                next_reset = %boundary,
                in_secs = time_until(now, boundary).num_seconds(),
                "Scheduled monthly usage reset"
            );

            wait_until(&self.clock, boundary).await;

            match self.registry.reset_usage().await {
                Ok(rows) => {
                    metrics::record_usage_reset();
                    tracing::info!(licenses = rows, "Monthly usage counts reset");
                }
                Err(e) => tracing::error!(error = %e, "Monthly usage reset failed"),
            }
        }
    }
}

/// Sleep until `clock` reaches `boundary`
///
/// Timers may fire early relative to the wall clock, so the remaining time is
/// re-measured after every wake-up.
async fn wait_until(clock: &Clock, boundary: DateTime<Utc>) {
    loop {
        let remaining = time_until(clock(), boundary);
        if remaining <= Duration::zero() {
            return;
        }
        let sleep_for = remaining
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));
        tokio::time::sleep(sleep_for).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::NewLicense;
    use crate::models::ScraperSet;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_next_boundary_mid_month() {
        assert_eq!(
            next_month_boundary(utc(2026, 10, 19, 14, 5, 0)),
            utc(2026, 11, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_next_boundary_december_rolls_year() {
        assert_eq!(
            next_month_boundary(utc(2026, 12, 31, 23, 59, 59)),
            utc(2027, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_next_boundary_at_boundary_moves_forward() {
        // Exactly at a boundary the reset has just run, so the next one is a month out.
        assert_eq!(
            next_month_boundary(utc(2026, 2, 1, 0, 0, 0)),
            utc(2026, 3, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_next_boundary_short_months() {
        assert_eq!(
            next_month_boundary(utc(2028, 2, 29, 12, 0, 0)),
            utc(2028, 3, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_time_until_not_before_boundary() {
        let boundary = utc(2026, 11, 1, 0, 0, 0);

        let one_second_before = utc(2026, 10, 31, 23, 59, 59);
        assert_eq!(time_until(one_second_before, boundary), Duration::seconds(1));

        assert_eq!(time_until(boundary, boundary), Duration::zero());
        assert_eq!(
            time_until(utc(2026, 11, 1, 0, 0, 1), boundary),
            Duration::zero()
        );
    }

    #[tokio::test]
    async fn test_wait_until_past_boundary_returns_immediately() {
        let past = Utc::now() - Duration::seconds(5);
        let clock: Clock = Arc::new(Utc::now);
        tokio::time::timeout(std::time::Duration::from_secs(1), wait_until(&clock, past))
            .await
            .expect("wait_until should not sleep for a past boundary");
    }

    /// Clock starting at `base` and advancing with tokio's (pausable) time
    fn tokio_clock(base: DateTime<Utc>) -> Clock {
        let start = tokio::time::Instant::now();
        Arc::new(move || base + Duration::from_std(start.elapsed()).unwrap())
    }

    async fn usage(registry: &LicenseRegistry) -> u32 {
        registry.list().await.unwrap()[0].usage_count
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_fires_at_month_boundary() {
        let registry = LicenseRegistry::in_memory().unwrap();
        let license = NewLicense::parse("acme", "2099-12-31", ScraperSet::new(["all"]), 10).unwrap();
        registry.create(license).await.unwrap();
        registry.validate("acme").await.unwrap();
        registry.validate("acme").await.unwrap();
        assert_eq!(usage(&registry).await, 2);

        let boundary = utc(2026, 11, 1, 0, 0, 0);
        let task = MonthlyReset::with_clock(
            registry.clone(),
            tokio_clock(boundary - Duration::seconds(10)),
        )
        .spawn();

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert_eq!(usage(&registry).await, 2, "reset ran before the boundary");

        let mut waited = 0;
        while usage(&registry).await != 0 {
            assert!(waited < 60, "reset did not run after the boundary");
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            waited += 1;
        }

        // Quota is usable again after the reset
        registry.validate("acme").await.unwrap();
        assert_eq!(usage(&registry).await, 1);

        task.abort();
    }
}
