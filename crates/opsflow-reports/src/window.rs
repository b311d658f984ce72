//! Reporting window rule.
//!
//! The window starts at the first day of the latest month that has any
//! records and ends now. A store with no rows (or an unparseable month)
//! falls back to the trailing year. The prior window is the immediately
//! preceding window of equal length, used for delta comparisons.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::warn;

use opsflow_core::error::Result;
use opsflow_core::traits::{EntityKind, RecordStore};

/// Compute `[start, end)` for the current report.
pub async fn report_window(store: &dyn RecordStore, entity: EntityKind) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let end = Utc::now();
    let start = match store.max_observed_month(entity).await? {
        Some(month) => month_floor(&month).unwrap_or_else(|| {
            warn!("⚠️ unparseable observed month '{month}', falling back to trailing year");
            end - Duration::days(365)
        }),
        None => end - Duration::days(365),
    };
    Ok((start, end))
}

/// The equal-length window immediately before `[start, end)`.
pub fn prior_window(start: DateTime<Utc>, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (start - (end - start), start)
}

// "YYYY-MM" to the first instant of that month.
fn month_floor(month: &str) -> Option<DateTime<Utc>> {
    let (year, month) = month.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// One bounded retry for idempotent store reads.
pub(crate) async fn retry_once<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!("⚠️ store read failed, retrying once: {first}");
            op().await
        }
    }
}
