//! The pipeline runner.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::outcome::{RunOutcome, RunPhase};
use crate::cancellation::CancellationToken;
use crate::context::PipelineContext;
use crate::errors::{ConfigurationError, PipelineError};
use crate::observability::PipelineMetrics;
use crate::pipeline::{Pipeline, PipelineRegistry, RetryPolicy};
use crate::utils::{generate_run_id, Clock, SystemClock, Timestamp};
use crate::watermark::WatermarkStore;

#[derive(Debug, Clone, Copy)]
enum RunMode {
    Forward,
    Backfill {
        start: Option<Timestamp>,
        end: Timestamp,
    },
}

/// Runs registered pipelines one window at a time.
///
/// A forward run covers `[last watermark, now)` and commits `now` as the new
/// watermark once the pipeline succeeds. At most one run per pipeline name is
/// in flight at any time.
pub struct PipelineRunner {
    registry: PipelineRegistry,
    watermarks: Arc<dyn WatermarkStore>,
    retry: RetryPolicy,
    metrics: Arc<PipelineMetrics>,
    clock: Arc<dyn Clock>,
    domain_tag: String,
    in_flight: DashMap<String, Uuid>,
}

impl PipelineRunner {
    /// Creates a runner with the default retry policy and the system clock.
    #[must_use]
    pub fn new(registry: PipelineRegistry, watermarks: Arc<dyn WatermarkStore>) -> Self {
        Self {
            registry,
            watermarks,
            retry: RetryPolicy::default(),
            metrics: Arc::new(PipelineMetrics::new()),
            clock: Arc::new(SystemClock),
            domain_tag: "default".to_string(),
            in_flight: DashMap::new(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shares an existing metrics instance.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the clock that supplies window ends.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the domain tag stamped on every context.
    #[must_use]
    pub fn with_domain_tag(mut self, domain_tag: impl Into<String>) -> Self {
        self.domain_tag = domain_tag.into();
        self
    }

    /// Returns the run counters.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Returns the pipeline registry.
    #[must_use]
    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Returns true while a run of `name` is in flight.
    #[must_use]
    pub fn is_running(&self, name: &str) -> bool {
        self.in_flight.contains_key(name)
    }

    /// Runs `name` forward from its last committed watermark to now.
    ///
    /// # Errors
    ///
    /// Returns the classified error of whichever phase failed. The watermark
    /// only moves when this returns `Ok`.
    pub async fn run(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        self.run_with_mode(name, RunMode::Forward, cancel).await
    }

    /// Re-runs `name` over an explicit window without moving its watermark.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidWindow`] when `start` is not
    /// strictly before `end`, before the pipeline is invoked.
    pub async fn run_backfill(
        &self,
        name: &str,
        start: Option<Timestamp>,
        end: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        self.run_with_mode(name, RunMode::Backfill { start, end }, cancel)
            .await
    }

    async fn run_with_mode(
        &self,
        name: &str,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        self.metrics.record_run(name);

        let mut phase = RunPhase::Idle;
        let result = self.run_phases(name, mode, cancel, &mut phase).await;
        let failed_in = phase;
        if result.is_err() {
            phase = RunPhase::Failed;
        }
        debug!(pipeline = %name, phase = %phase, "Run finished");

        match &result {
            Ok(outcome) => {
                self.metrics.record_success(name);
                info!(
                    pipeline = %name,
                    run_id = %outcome.run_id,
                    attempts = outcome.attempts,
                    backfill = outcome.is_backfill,
                    "Pipeline run completed"
                );
            }
            Err(err) if err.is_cancelled() => {
                self.metrics.record_failure(name, true);
                warn!(pipeline = %name, phase = %failed_in, error = %err, "Pipeline run cancelled");
            }
            Err(err) => {
                self.metrics.record_failure(name, false);
                error!(
                    pipeline = %name,
                    phase = %failed_in,
                    kind = err.failure_kind().map_or("unclassified", |k| k.as_str()),
                    error = %err,
                    "Pipeline run failed"
                );
            }
        }

        result
    }

    async fn run_phases(
        &self,
        name: &str,
        mode: RunMode,
        cancel: &CancellationToken,
        phase: &mut RunPhase,
    ) -> Result<RunOutcome, PipelineError> {
        *phase = RunPhase::Resolving;
        let pipeline = self.registry.resolve(name)?;
        let run_id = generate_run_id();
        let _guard = self.claim(name, run_id)?;

        *phase = RunPhase::Validating;
        let ctx = self.build_context(name, mode).await?.with_run_id(run_id);
        let window_end = ctx.validate()?;

        let span = info_span!(
            "pipeline_run",
            pipeline = %name,
            run_id = %run_id,
            window = %ctx.window_label(),
            backfill = ctx.is_backfill(),
        );

        async {
            *phase = RunPhase::Executing;
            info!("Pipeline run started");
            let attempts = self.execute(pipeline.as_ref(), &ctx, cancel).await?;

            *phase = RunPhase::Committing;
            cancel.error_if_cancelled()?;
            let committed_watermark = if ctx.is_backfill() {
                None
            } else {
                self.watermarks.save(name, window_end).await?;
                Some(window_end)
            };

            *phase = RunPhase::Completed;
            Ok(RunOutcome {
                run_id,
                pipeline_name: name.to_string(),
                window_start: ctx.window_start(),
                window_end,
                is_backfill: ctx.is_backfill(),
                attempts,
                committed_watermark,
            })
        }
        .instrument(span)
        .await
    }

    async fn build_context(
        &self,
        name: &str,
        mode: RunMode,
    ) -> Result<PipelineContext, PipelineError> {
        let now = self.clock.now();
        match mode {
            RunMode::Forward => {
                let watermark = self.watermarks.get(name).await?;
                Ok(PipelineContext::forward(name, &self.domain_tag, watermark, now))
            }
            RunMode::Backfill { start, end } => Ok(PipelineContext::backfill(
                name,
                &self.domain_tag,
                start,
                end,
                now,
            )),
        }
    }

    /// Runs the pipeline under the retry policy, returning the attempt count.
    async fn execute(
        &self,
        pipeline: &dyn Pipeline,
        ctx: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<u32, PipelineError> {
        let mut attempts = 0;
        self.retry
            .execute(pipeline.name(), cancel, |attempt| {
                attempts = attempt;
                pipeline.run(ctx, cancel)
            })
            .await?;
        Ok(attempts)
    }

    fn claim(&self, name: &str, run_id: Uuid) -> Result<InFlightGuard<'_>, ConfigurationError> {
        match self.in_flight.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ConfigurationError::RunInProgress {
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Ok(InFlightGuard {
                    in_flight: &self.in_flight,
                    name: name.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("domain_tag", &self.domain_tag)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Releases a pipeline's single-run slot when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, Uuid>,
    name: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.name);
    }
}
