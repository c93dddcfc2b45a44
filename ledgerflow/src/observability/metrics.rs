//! In-process run counters.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    /// Runs attempted.
    pub runs: u64,
    /// Runs that ended in failure, cancellation included.
    pub failures: u64,
    /// Runs that committed.
    pub successes: u64,
    /// Runs that ended because of cancellation.
    pub cancellations: u64,
}

/// Run counters shared by the runner and the scheduler.
///
/// Each run increments `runs` exactly once and then exactly one of
/// `successes` or `failures`, regardless of how many attempts it took.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    runs: AtomicU64,
    failures: AtomicU64,
    successes: AtomicU64,
    cancellations: AtomicU64,
    per_pipeline: DashMap<String, PipelineCounters>,
}

impl PipelineMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a run.
    pub fn record_run(&self, pipeline: &str) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.per_pipeline.entry(pipeline.to_string()).or_default().runs += 1;
    }

    /// Records a committed run.
    pub fn record_success(&self, pipeline: &str) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.per_pipeline
            .entry(pipeline.to_string())
            .or_default()
            .successes += 1;
    }

    /// Records a failed run. Cancelled runs count as failures too.
    pub fn record_failure(&self, pipeline: &str, cancelled: bool) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if cancelled {
            self.cancellations.fetch_add(1, Ordering::Relaxed);
        }

        let mut counters = self.per_pipeline.entry(pipeline.to_string()).or_default();
        counters.failures += 1;
        if cancelled {
            counters.cancellations += 1;
        }
    }

    /// Returns the number of runs attempted.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Returns the number of failed runs.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Returns the number of committed runs.
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Returns the number of cancelled runs.
    #[must_use]
    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::Relaxed)
    }

    /// Returns the counters for one pipeline.
    #[must_use]
    pub fn for_pipeline(&self, pipeline: &str) -> PipelineCounters {
        self.per_pipeline
            .get(pipeline)
            .map(|c| *c)
            .unwrap_or_default()
    }

    /// Takes a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs(),
            failures: self.failures(),
            successes: self.successes(),
            cancellations: self.cancellations(),
            pipelines: self
                .per_pipeline
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }

    /// Converts the counters to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "pipeline.runs": self.runs(),
            "pipeline.failures": self.failures(),
            "pipeline.successes": self.successes(),
            "pipeline.cancellations": self.cancellations(),
        })
    }
}

/// A copy of [`PipelineMetrics`] at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Runs attempted.
    pub runs: u64,
    /// Failed runs.
    pub failures: u64,
    /// Committed runs.
    pub successes: u64,
    /// Cancelled runs.
    pub cancellations: u64,
    /// Per-pipeline counters, keyed by name.
    pub pipelines: BTreeMap<String, PipelineCounters>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counters_per_pipeline() {
        let metrics = PipelineMetrics::new();
        metrics.record_run("a");
        metrics.record_success("a");
        metrics.record_run("b");
        metrics.record_failure("b", false);
        metrics.record_run("b");
        metrics.record_failure("b", true);

        assert_eq!(metrics.runs(), 3);
        assert_eq!(metrics.successes(), 1);
        assert_eq!(metrics.failures(), 2);
        assert_eq!(metrics.cancellations(), 1);
        assert_eq!(
            metrics.for_pipeline("b"),
            PipelineCounters {
                runs: 2,
                failures: 2,
                successes: 0,
                cancellations: 1
            }
        );
        assert_eq!(metrics.for_pipeline("unknown"), PipelineCounters::default());
    }

    #[test]
    fn test_snapshot_and_dict() {
        let metrics = PipelineMetrics::new();
        metrics.record_run("a");
        metrics.record_failure("a", false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 1);
        assert_eq!(snapshot.pipelines["a"].failures, 1);

        let dict = metrics.to_dict();
        assert_eq!(dict["pipeline.runs"], 1);
        assert_eq!(dict["pipeline.failures"], 1);
    }
}
