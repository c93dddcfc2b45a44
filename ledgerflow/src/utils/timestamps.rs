//! Timestamp and clock utilities.

use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as an ISO 8601 / RFC 3339 string with a `Z` suffix.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

/// Returns the `YYYY-MM-DD` day a timestamp falls on, used to partition files.
#[must_use]
pub fn partition_day(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// Source of the current time.
///
/// The runner asks its clock for the end of every forward window, so tests
/// can pin window boundaries with a manual clock.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current UTC time.
    fn now(&self) -> Timestamp;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now_utc()
    }
}
