//! Test fixtures: a controllable clock and NDJSON helpers.

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::errors::{FailureKind, PipelineError};
use crate::utils::{Clock, Timestamp};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
    tick: Option<Duration>,
}

impl ManualClock {
    /// Creates a clock stopped at `at`.
    #[must_use]
    pub fn new(at: Timestamp) -> Self {
        Self {
            now: RwLock::new(at),
            tick: None,
        }
    }

    /// Creates a clock starting at [`fixed_time`] that moves forward by `step`
    /// after every reading.
    #[must_use]
    pub fn ticking(step: Duration) -> Self {
        Self {
            now: RwLock::new(fixed_time()),
            tick: Some(step),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        *self.now.write() = at;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Default for ManualClock {
    /// Stopped at 2024-01-15T10:00:00Z.
    fn default() -> Self {
        Self::new(fixed_time())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let mut now = self.now.write();
        let reading = *now;
        if let Some(step) = self.tick {
            *now += step;
        }
        reading
    }
}

/// The fixed instant 2024-01-15T10:00:00Z.
#[must_use]
pub fn fixed_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Parses an RFC 3339 timestamp.
///
/// # Panics
///
/// Panics if `value` is not valid RFC 3339.
#[must_use]
pub fn timestamp(value: &str) -> Timestamp {
    DateTime::parse_from_rfc3339(value)
        .unwrap_or_else(|e| panic!("invalid timestamp '{value}': {e}"))
        .with_timezone(&Utc)
}

/// Reads every line of an NDJSON file. A missing file reads as empty.
///
/// # Panics
///
/// Panics if a line cannot be decoded as `T`.
#[must_use]
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|e| panic!("bad NDJSON line '{line}': {e}"))
        })
        .collect()
}

/// Asserts that `err` is classified as `expected`.
pub fn assert_failure_kind(err: &PipelineError, expected: FailureKind) {
    assert_eq!(
        err.failure_kind(),
        Some(expected),
        "Expected {expected} failure, got: {err}"
    );
}
