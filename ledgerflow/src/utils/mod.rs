//! Utility functions for run identifiers, timestamps and file handling.

pub(crate) mod fs;
pub mod timestamps;

pub use timestamps::{format_iso8601, now_utc, partition_day, Clock, SystemClock, Timestamp};

use uuid::Uuid;

/// Generates a new random run identifier.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}
