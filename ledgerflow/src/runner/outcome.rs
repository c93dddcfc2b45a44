//! Run phases and results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::utils::{format_iso8601, Timestamp};

/// The phases a single run moves through.
///
/// `Idle → Resolving → Validating → Executing → Committing → Completed`,
/// with a `Failed` exit from any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Not started.
    Idle,
    /// Looking up the pipeline and claiming its single-run slot.
    Resolving,
    /// Building and checking the run window.
    Validating,
    /// Running the pipeline under the retry policy.
    Executing,
    /// Persisting the new watermark.
    Committing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl RunPhase {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Committing => "committing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run identifier, shared with the context the pipeline saw.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline_name: String,
    /// Window start. `None` means unbounded.
    pub window_start: Option<Timestamp>,
    /// Window end.
    pub window_end: Timestamp,
    /// Whether this was a backfill.
    pub is_backfill: bool,
    /// Number of attempts the retry policy made.
    pub attempts: u32,
    /// The watermark written, if any. Backfills never write one.
    pub committed_watermark: Option<Timestamp>,
}

impl RunOutcome {
    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut dict = HashMap::new();
        dict.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        dict.insert("pipeline".to_string(), serde_json::json!(self.pipeline_name));
        dict.insert(
            "window_start".to_string(),
            serde_json::json!(self.window_start.as_ref().map(format_iso8601)),
        );
        dict.insert(
            "window_end".to_string(),
            serde_json::json!(format_iso8601(&self.window_end)),
        );
        dict.insert("is_backfill".to_string(), serde_json::json!(self.is_backfill));
        dict.insert("attempts".to_string(), serde_json::json!(self.attempts));
        dict.insert(
            "committed_watermark".to_string(),
            serde_json::json!(self.committed_watermark.as_ref().map(format_iso8601)),
        );
        dict
    }
}
