//! The immutable per-run descriptor handed to every pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ConfigurationError;
use crate::utils::{format_iso8601, generate_run_id, Timestamp};

/// Describes one pipeline run: who is running, and which time window it covers.
///
/// A context is created once per run by the runner, validated before any
/// extraction starts, and discarded when the run ends. Its fields cannot be
/// changed after construction; the `with_*` builders consume the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineContext {
    run_id: Uuid,
    pipeline_name: String,
    domain_tag: String,
    started_at: Timestamp,
    window_start: Option<Timestamp>,
    window_end: Option<Timestamp>,
    is_backfill: bool,
}

impl PipelineContext {
    /// Creates a context with a fresh run id and no window.
    #[must_use]
    pub fn new(
        pipeline_name: impl Into<String>,
        domain_tag: impl Into<String>,
        started_at: Timestamp,
    ) -> Self {
        Self {
            run_id: generate_run_id(),
            pipeline_name: pipeline_name.into(),
            domain_tag: domain_tag.into(),
            started_at,
            window_start: None,
            window_end: None,
            is_backfill: false,
        }
    }

    /// Creates a forward run context covering `[watermark, now)`.
    #[must_use]
    pub fn forward(
        pipeline_name: impl Into<String>,
        domain_tag: impl Into<String>,
        watermark: Option<Timestamp>,
        now: Timestamp,
    ) -> Self {
        Self::new(pipeline_name, domain_tag, now).with_window(watermark, Some(now))
    }

    /// Creates a backfill context with an explicit window.
    #[must_use]
    pub fn backfill(
        pipeline_name: impl Into<String>,
        domain_tag: impl Into<String>,
        window_start: Option<Timestamp>,
        window_end: Timestamp,
        now: Timestamp,
    ) -> Self {
        let mut ctx = Self::new(pipeline_name, domain_tag, now)
            .with_window(window_start, Some(window_end));
        ctx.is_backfill = true;
        ctx
    }

    /// Sets the run window.
    #[must_use]
    pub fn with_window(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.window_start = start;
        self.window_end = end;
        self
    }

    /// Overrides the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Checks the window invariants and returns the window end.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidWindow`] when `window_end` is unset
    /// or `window_start` is not strictly before it.
    pub fn validate(&self) -> Result<Timestamp, ConfigurationError> {
        let Some(end) = self.window_end else {
            return Err(ConfigurationError::invalid_window(
                &self.pipeline_name,
                "window_end must be set before execution",
            ));
        };

        if let Some(start) = self.window_start {
            if start >= end {
                return Err(ConfigurationError::invalid_window(
                    &self.pipeline_name,
                    format!(
                        "window_start {} is not before window_end {}",
                        format_iso8601(&start),
                        format_iso8601(&end)
                    ),
                ));
            }
        }

        Ok(end)
    }

    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Returns the domain tag (e.g. the sport or market segment being tracked).
    #[must_use]
    pub fn domain_tag(&self) -> &str {
        &self.domain_tag
    }

    /// Returns when the run started.
    #[must_use]
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Returns the inclusive window start, `None` for the first run.
    #[must_use]
    pub const fn window_start(&self) -> Option<Timestamp> {
        self.window_start
    }

    /// Returns the exclusive window end.
    #[must_use]
    pub const fn window_end(&self) -> Option<Timestamp> {
        self.window_end
    }

    /// Returns true for backfill runs.
    #[must_use]
    pub const fn is_backfill(&self) -> bool {
        self.is_backfill
    }

    /// Renders the window as `[start, end)` for logs.
    #[must_use]
    pub fn window_label(&self) -> String {
        let render =
            |ts: Option<Timestamp>| ts.map_or_else(|| "null".to_string(), |t| format_iso8601(&t));
        format!("[{}, {})", render(self.window_start), render(self.window_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t(hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_forward_first_run_has_null_start() {
        let ctx = PipelineContext::forward("p1", "cbb", None, t(10));

        assert_eq!(ctx.window_start(), None);
        assert_eq!(ctx.window_end(), Some(t(10)));
        assert!(!ctx.is_backfill());
        assert_eq!(ctx.validate().unwrap(), t(10));
    }

    #[test]
    fn test_forward_uses_watermark_as_start() {
        let ctx = PipelineContext::forward("p1", "cbb", Some(t(8)), t(10));

        assert_eq!(ctx.window_start(), Some(t(8)));
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_backfill_sets_flag_and_window() {
        let ctx = PipelineContext::backfill("p1", "cbb", Some(t(1)), t(2), t(10));

        assert!(ctx.is_backfill());
        assert_eq!(ctx.window_start(), Some(t(1)));
        assert_eq!(ctx.window_end(), Some(t(2)));
        assert_eq!(ctx.started_at(), t(10));
    }

    #[test]
    fn test_missing_window_end_is_rejected() {
        let ctx = PipelineContext::new("p1", "cbb", t(10));

        let err = ctx.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidWindow { .. }));
    }

    #[test]
    fn test_start_equal_to_end_is_rejected() {
        let ctx = PipelineContext::forward("p1", "cbb", Some(t(10)), t(10));
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_start_after_end_is_rejected() {
        let ctx = PipelineContext::forward("p1", "cbb", Some(t(10) + Duration::seconds(1)), t(10));
        let err = ctx.validate().unwrap_err();
        assert!(err.to_string().contains("not before"));
    }

    #[test]
    fn test_each_context_gets_a_fresh_run_id() {
        let a = PipelineContext::forward("p1", "cbb", None, t(10));
        let b = PipelineContext::forward("p1", "cbb", None, t(10));
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn test_window_label() {
        let ctx = PipelineContext::forward("p1", "cbb", None, t(10));
        assert_eq!(ctx.window_label(), "[null, 2024-01-15T10:00:00Z)");
    }
}
