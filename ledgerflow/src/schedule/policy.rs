//! Declarative schedule entries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ConfigurationError;

/// When the scheduler starts a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Never started by the scheduler; run through [`super::Scheduler::trigger`].
    #[default]
    Manual,
    /// Run once when the scheduler starts.
    OnStartup,
    /// Run, sleep for the interval, run again, until cancelled.
    Scheduled,
}

impl ExecutionPolicy {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::OnStartup => "on_startup",
            Self::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline's schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSchedule {
    /// Registered pipeline name.
    pub pipeline_name: String,
    /// Execution policy.
    #[serde(default)]
    pub policy: ExecutionPolicy,
    /// Seconds between the end of one run and the start of the next.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

impl PipelineSchedule {
    /// A schedule that only runs when triggered.
    #[must_use]
    pub fn manual(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            policy: ExecutionPolicy::Manual,
            interval_secs: None,
        }
    }

    /// A schedule that runs once at startup.
    #[must_use]
    pub fn on_startup(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            policy: ExecutionPolicy::OnStartup,
            interval_secs: None,
        }
    }

    /// A schedule that runs every `interval`.
    ///
    /// Intervals are stored in whole seconds; a fractional part rounds up, so
    /// any non-zero `interval` yields a runnable schedule.
    #[must_use]
    pub fn every(pipeline_name: impl Into<String>, interval: Duration) -> Self {
        let secs = interval.as_secs() + u64::from(interval.subsec_nanos() > 0);
        Self {
            pipeline_name: pipeline_name.into(),
            policy: ExecutionPolicy::Scheduled,
            interval_secs: Some(secs),
        }
    }

    /// Returns the interval when it is set and positive.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Checks the entry on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSchedule`] for a blank name or a
    /// `Scheduled` entry without a positive interval.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_schedule(
                &self.pipeline_name,
                "pipeline name is blank",
            ));
        }
        if self.policy == ExecutionPolicy::Scheduled && self.interval().is_none() {
            return Err(ConfigurationError::invalid_schedule(
                &self.pipeline_name,
                "scheduled policy requires a positive interval_secs",
            ));
        }
        Ok(())
    }
}
