//! Timestamp helpers.

use chrono::{DateTime, Datelike, Utc};
use std::time::Duration;

/// UTC timestamp used across persisted documents.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 string with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the `YYYY`, `MM` path segments for a timestamp.
#[must_use]
pub fn date_partition(ts: &Timestamp) -> [String; 2] {
    [format!("{:04}", ts.year()), format!("{:02}", ts.month())]
}

/// Duration in whole milliseconds, saturating at `u64::MAX`.
#[must_use]
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
