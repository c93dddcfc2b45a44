//! Drives configured pipelines according to their execution policy.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::policy::{ExecutionPolicy, PipelineSchedule};
use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;
use crate::runner::{PipelineRunner, RunOutcome};

/// Runs every non-manual schedule as its own task until cancelled.
///
/// Loops are independent: a failing run is logged and the loop carries on,
/// and one pipeline's failure never stops another's loop.
#[derive(Debug)]
pub struct Scheduler {
    runner: Arc<PipelineRunner>,
    schedules: Vec<PipelineSchedule>,
}

impl Scheduler {
    /// Creates a scheduler over `schedules`.
    #[must_use]
    pub fn new(runner: Arc<PipelineRunner>, schedules: Vec<PipelineSchedule>) -> Self {
        Self { runner, schedules }
    }

    /// Returns the configured schedules.
    #[must_use]
    pub fn schedules(&self) -> &[PipelineSchedule] {
        &self.schedules
    }

    /// Returns the runner.
    #[must_use]
    pub fn runner(&self) -> &Arc<PipelineRunner> {
        &self.runner
    }

    /// Runs one pipeline once, regardless of its policy.
    ///
    /// # Errors
    ///
    /// Returns the runner's error for the run.
    pub async fn trigger(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        info!(pipeline = %name, "Manual trigger");
        self.runner.run(name, cancel).await
    }

    /// Starts every `OnStartup` and `Scheduled` entry and waits for all of
    /// them to finish.
    ///
    /// `OnStartup` loops finish after one run; `Scheduled` loops finish when
    /// `cancel` fires.
    pub async fn run(&self, cancel: Arc<CancellationToken>) -> SchedulerReport {
        let active: Vec<PipelineSchedule> = self
            .schedules
            .iter()
            .filter(|s| s.policy != ExecutionPolicy::Manual)
            .cloned()
            .collect();

        info!(
            configured = self.schedules.len(),
            started = active.len(),
            "Scheduler starting"
        );

        let handles = active.into_iter().map(|schedule| {
            let runner = Arc::clone(&self.runner);
            let cancel = Arc::clone(&cancel);
            let name = schedule.pipeline_name.clone();
            let handle = tokio::spawn(run_schedule(runner, schedule, cancel));
            async move { (name, handle.await) }
        });

        let mut report = SchedulerReport::default();
        for (name, joined) in join_all(handles).await {
            match joined {
                Ok(loop_report) => report.loops.push(loop_report),
                Err(e) => error!(pipeline = %name, error = %e, "Schedule task aborted"),
            }
        }

        info!(
            completed = report.total_completed(),
            failed = report.total_failed(),
            "Scheduler stopped"
        );
        report
    }
}

async fn run_schedule(
    runner: Arc<PipelineRunner>,
    schedule: PipelineSchedule,
    cancel: Arc<CancellationToken>,
) -> LoopReport {
    let mut report = LoopReport::new(&schedule);

    match schedule.policy {
        ExecutionPolicy::Manual => {}
        ExecutionPolicy::OnStartup => {
            if !cancel.is_cancelled() {
                report.record(runner.run(&schedule.pipeline_name, &cancel).await);
            }
        }
        ExecutionPolicy::Scheduled => {
            let Some(interval) = schedule.interval() else {
                error!(
                    pipeline = %schedule.pipeline_name,
                    "Scheduled pipeline has no positive interval, skipping"
                );
                report.skipped = true;
                return report;
            };

            while !cancel.is_cancelled() {
                report.record(runner.run(&schedule.pipeline_name, &cancel).await);
                if !cancel.sleep(interval).await {
                    break;
                }
            }
        }
    }

    info!(
        pipeline = %schedule.pipeline_name,
        completed = report.completed,
        failed = report.failed,
        "Schedule loop finished"
    );
    report
}

/// What one schedule loop did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    /// Pipeline name.
    pub pipeline_name: String,
    /// The entry's policy.
    pub policy: ExecutionPolicy,
    /// Runs that completed.
    pub completed: u64,
    /// Runs that failed or were cancelled.
    pub failed: u64,
    /// The entry was not started because it is invalid.
    pub skipped: bool,
}

impl LoopReport {
    fn new(schedule: &PipelineSchedule) -> Self {
        Self {
            pipeline_name: schedule.pipeline_name.clone(),
            policy: schedule.policy,
            completed: 0,
            failed: 0,
            skipped: false,
        }
    }

    fn record(&mut self, result: Result<RunOutcome, PipelineError>) {
        match result {
            Ok(_) => self.completed += 1,
            Err(err) => {
                self.failed += 1;
                if !err.is_cancelled() {
                    warn!(
                        pipeline = %self.pipeline_name,
                        error = %err,
                        "Scheduled run failed, continuing"
                    );
                }
            }
        }
    }
}

/// Per-loop results of [`Scheduler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    /// One entry per started loop.
    pub loops: Vec<LoopReport>,
}

impl SchedulerReport {
    /// Returns the report for `pipeline_name`.
    #[must_use]
    pub fn get(&self, pipeline_name: &str) -> Option<&LoopReport> {
        self.loops.iter().find(|l| l.pipeline_name == pipeline_name)
    }

    /// Total completed runs across loops.
    #[must_use]
    pub fn total_completed(&self) -> u64 {
        self.loops.iter().map(|l| l.completed).sum()
    }

    /// Total failed runs across loops.
    #[must_use]
    pub fn total_failed(&self) -> u64 {
        self.loops.iter().map(|l| l.failed).sum()
    }
}
