//! Pipeline run orchestration.
//!
//! [`PipelineRunner`] resolves a pipeline by name, builds its run window from
//! the watermark store, validates it, executes the pipeline under the retry
//! policy and commits the new watermark only on success.

mod executor;
mod outcome;

pub use executor::PipelineRunner;
pub use outcome::{RunOutcome, RunPhase};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::errors::{ConfigurationError, FailureKind, PipelineError, StorageError};
    use crate::pipeline::{BackoffStrategy, PipelineRegistry, RetryConfig, RetryPolicy};
    use crate::testing::{assert_failure_kind, timestamp, ManualClock, RecordingPipeline};
    use crate::utils::Clock;
    use crate::watermark::{InMemoryWatermarkStore, MockWatermarkStore, WatermarkStore};
    use chrono::Duration as ChronoDuration;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        runner: PipelineRunner,
        pipeline: Arc<RecordingPipeline>,
        store: Arc<InMemoryWatermarkStore>,
        clock: Arc<ManualClock>,
    }

    fn harness(pipeline: RecordingPipeline) -> Harness {
        let pipeline = Arc::new(pipeline);
        let store = Arc::new(InMemoryWatermarkStore::new());
        let clock = Arc::new(ManualClock::default());
        let runner = PipelineRunner::new(
            PipelineRegistry::new().with(pipeline.clone()),
            store.clone(),
        )
        .with_clock(clock.clone())
        .with_domain_tag("odds");

        Harness {
            runner,
            pipeline,
            store,
            clock,
        }
    }

    fn storage_failure() -> StorageError {
        StorageError::Io {
            path: PathBuf::from("watermarks.json"),
            source: std::io::Error::other("disk unavailable"),
        }
    }

    #[tokio::test]
    async fn test_forward_runs_chain_windows() {
        let h = harness(RecordingPipeline::new("p1"));
        let cancel = CancellationToken::new();
        let t1 = h.clock.now();

        let first = h.runner.run("p1", &cancel).await.unwrap();
        assert_eq!(first.window_start, None);
        assert_eq!(first.committed_watermark, Some(t1));
        assert_eq!(first.attempts, 1);

        h.clock.advance(ChronoDuration::hours(1));
        let second = h.runner.run("p1", &cancel).await.unwrap();
        assert_eq!(second.window_start, Some(t1));
        assert_eq!(h.store.get("p1").await.unwrap(), Some(h.clock.now()));

        let contexts = h.pipeline.contexts();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[1].run_id(), second.run_id);
        assert_eq!(contexts[1].domain_tag(), "odds");
        assert_eq!(h.runner.metrics().successes(), 2);
    }

    #[tokio::test]
    async fn test_failed_run_keeps_watermark() {
        let h = harness(RecordingPipeline::new("p1").with_failures(1, FailureKind::Permanent));
        let cancel = CancellationToken::new();

        let err = h.runner.run("p1", &cancel).await.unwrap_err();

        assert_failure_kind(&err, FailureKind::Permanent);
        assert_eq!(h.store.get("p1").await.unwrap(), None);
        assert_eq!(h.runner.metrics().runs(), 1);
        assert_eq!(h.runner.metrics().failures(), 1);
        assert!(!h.runner.is_running("p1"));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_fatal() {
        let h = harness(RecordingPipeline::new("p1"));

        let err = h.runner.run("nope", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigurationError::UnknownPipeline { .. })
        ));
        assert_failure_kind(&err, FailureKind::Fatal);
        assert_eq!(h.runner.metrics().failures(), 1);
    }

    #[tokio::test]
    async fn test_backfill_with_inverted_window_never_runs() {
        let h = harness(RecordingPipeline::new("p1"));
        let start = timestamp("2024-01-10T00:00:00Z");
        let end = timestamp("2024-01-09T00:00:00Z");

        let err = h
            .runner
            .run_backfill("p1", Some(start), end, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigurationError::InvalidWindow { .. })
        ));
        assert_eq!(h.pipeline.call_count(), 0);
    }

    #[tokio::test]
    async fn test_backfill_does_not_move_watermark() {
        let h = harness(RecordingPipeline::new("p1"));
        let cancel = CancellationToken::new();
        h.runner.run("p1", &cancel).await.unwrap();
        let committed = h.store.get("p1").await.unwrap();

        let outcome = h
            .runner
            .run_backfill(
                "p1",
                Some(timestamp("2024-01-01T00:00:00Z")),
                timestamp("2024-01-02T00:00:00Z"),
                &cancel,
            )
            .await
            .unwrap();

        assert!(outcome.is_backfill);
        assert_eq!(outcome.committed_watermark, None);
        assert_eq!(h.store.get("p1").await.unwrap(), committed);
        assert!(h.pipeline.contexts()[1].is_backfill());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_within_one_run() {
        let h = harness(RecordingPipeline::new("p1").with_failures(2, FailureKind::Transient));
        let runner = h.runner.with_retry_policy(RetryPolicy::new(
            RetryConfig::default()
                .with_base_delay_ms(10)
                .with_backoff(BackoffStrategy::Constant),
        ));

        let outcome = runner.run("p1", &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(h.pipeline.call_count(), 3);
        assert_eq!(runner.metrics().runs(), 1);
        assert_eq!(runner.metrics().failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_of_same_pipeline_is_rejected() {
        let h = harness(RecordingPipeline::new("p1").with_delay(Duration::from_secs(30)));
        let cancel = CancellationToken::new();

        let first = h.runner.run("p1", &cancel);
        let second = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert!(h.runner.is_running("p1"));
            h.runner.run("p1", &cancel).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert!(matches!(
            second.unwrap_err(),
            PipelineError::Configuration(ConfigurationError::RunInProgress { .. })
        ));
        assert_eq!(h.pipeline.call_count(), 1);
        assert!(!h.runner.is_running("p1"));
    }

    #[tokio::test]
    async fn test_cancelled_run_never_commits() {
        let h = harness(RecordingPipeline::new("p1"));
        let cancel = CancellationToken::new();
        cancel.cancel("shutdown");

        let err = h.runner.run("p1", &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(h.store.get("p1").await.unwrap(), None);
        assert_eq!(h.runner.metrics().cancellations(), 1);
        assert_eq!(h.runner.metrics().failures(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_watermark_fails_before_running() {
        let pipeline = Arc::new(RecordingPipeline::new("p1"));
        let mut store = MockWatermarkStore::new();
        store.expect_get().returning(|_| Err(storage_failure()));
        store.expect_save().never();

        let runner = PipelineRunner::new(
            PipelineRegistry::new().with(pipeline.clone()),
            Arc::new(store),
        );
        let err = runner.run("p1", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Storage(_)));
        assert_eq!(pipeline.call_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_fails_the_run() {
        let pipeline = Arc::new(RecordingPipeline::new("p1"));
        let mut store = MockWatermarkStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_save()
            .times(1)
            .returning(|_, _| Err(storage_failure()));

        let runner = PipelineRunner::new(
            PipelineRegistry::new().with(pipeline.clone()),
            Arc::new(store),
        );
        let err = runner.run("p1", &CancellationToken::new()).await.unwrap_err();

        assert_failure_kind(&err, FailureKind::Permanent);
        assert_eq!(pipeline.call_count(), 1);
        assert_eq!(runner.metrics().failures(), 1);
    }
}
