//! Scripted pipeline steps for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::context::PipelineContext;
use crate::errors::{FailureKind, PipelineError, PipelineFailure};
use crate::pipeline::{ContextualExtractor, Extractor, Loader, Pipeline};

/// A failure to replay. [`PipelineFailure`] carries a boxed source and is not
/// `Clone`, so only its classification and message are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptedFailure {
    kind: FailureKind,
    message: String,
}

impl ScriptedFailure {
    fn from_failure(failure: &PipelineFailure) -> Self {
        Self {
            kind: failure.kind,
            message: failure.message.clone(),
        }
    }

    fn to_error(&self) -> PipelineError {
        PipelineFailure::new(self.kind, self.message.clone()).into()
    }
}

/// An extractor that fails a scripted number of times and then yields a
/// fixed value. Implements both extractor traits.
#[derive(Debug)]
pub struct ScriptedExtractor<T> {
    value: Option<T>,
    failure: Option<ScriptedFailure>,
    failures_left: Mutex<usize>,
    call_count: Mutex<usize>,
    contexts: Mutex<Vec<PipelineContext>>,
}

impl<T: Clone + Send + Sync> ScriptedExtractor<T> {
    /// Creates an extractor that always yields `value`.
    #[must_use]
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            failure: None,
            failures_left: Mutex::new(0),
            call_count: Mutex::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Creates an extractor that always fails with `failure`'s kind and message.
    #[must_use]
    pub fn failing(failure: PipelineFailure) -> Self {
        Self {
            value: None,
            failure: Some(ScriptedFailure::from_failure(&failure)),
            failures_left: Mutex::new(usize::MAX),
            call_count: Mutex::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Fails the first `count` calls with `failure` before yielding the value.
    #[must_use]
    pub fn with_failures(mut self, count: usize, failure: PipelineFailure) -> Self {
        self.failure = Some(ScriptedFailure::from_failure(&failure));
        *self.failures_left.get_mut() = count;
        self
    }

    /// Returns the number of extract calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Returns the run ids of the contexts passed to contextual extraction.
    #[must_use]
    pub fn seen_run_ids(&self) -> Vec<Uuid> {
        self.contexts.lock().iter().map(PipelineContext::run_id).collect()
    }

    /// Returns the contexts passed to contextual extraction.
    #[must_use]
    pub fn seen_contexts(&self) -> Vec<PipelineContext> {
        self.contexts.lock().clone()
    }

    fn next(&self) -> Result<T, PipelineError> {
        *self.call_count.lock() += 1;

        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                if let Some(failure) = &self.failure {
                    *left = left.saturating_sub(1);
                    return Err(failure.to_error());
                }
            }
        }

        self.value
            .clone()
            .ok_or_else(|| PipelineFailure::fatal("scripted extractor has no value").into())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> Extractor<T> for ScriptedExtractor<T> {
    async fn extract(&self, _cancel: &CancellationToken) -> Result<T, PipelineError> {
        self.next()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ContextualExtractor<T> for ScriptedExtractor<T> {
    async fn extract(
        &self,
        ctx: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<T, PipelineError> {
        self.contexts.lock().push(ctx.clone());
        self.next()
    }
}

/// A loader that keeps every value it receives.
#[derive(Debug)]
pub struct CollectingLoader<T> {
    loaded: Mutex<Vec<T>>,
}

impl<T: Clone + Send> CollectingLoader<T> {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loaded: Mutex::new(Vec::new()),
        }
    }

    /// Returns the loaded values in arrival order.
    #[must_use]
    pub fn loaded(&self) -> Vec<T> {
        self.loaded.lock().clone()
    }
}

impl<T: Clone + Send> Default for CollectingLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Loader<T> for CollectingLoader<T> {
    async fn load(&self, value: T, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.loaded.lock().push(value);
        Ok(())
    }
}

/// A pipeline that records the contexts it runs with.
#[derive(Debug)]
pub struct RecordingPipeline {
    name: String,
    delay: Option<Duration>,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    always_fail: Option<FailureKind>,
    contexts: Mutex<Vec<PipelineContext>>,
}

impl RecordingPipeline {
    /// Creates a pipeline whose runs always succeed.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            failures: Mutex::new(VecDeque::new()),
            always_fail: None,
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Fails the next `count` runs with the given kind.
    #[must_use]
    pub fn with_failures(self, count: usize, kind: FailureKind) -> Self {
        {
            let mut failures = self.failures.lock();
            for n in 0..count {
                failures.push_back(ScriptedFailure {
                    kind,
                    message: format!("scripted failure {}", n + 1),
                });
            }
        }
        self
    }

    /// Fails every run with the given kind.
    #[must_use]
    pub fn always_failing(mut self, kind: FailureKind) -> Self {
        self.always_fail = Some(kind);
        self
    }

    /// Makes every run take `delay`, waking early on cancellation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of runs.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Returns the context of every run.
    #[must_use]
    pub fn contexts(&self) -> Vec<PipelineContext> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl Pipeline for RecordingPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.contexts.lock().push(ctx.clone());

        if let Some(delay) = self.delay {
            if !cancel.sleep(delay).await {
                return Err(cancel.to_error());
            }
        }

        if let Some(kind) = self.always_fail {
            return Err(PipelineFailure::new(kind, "scripted failure").into());
        }

        let next = self.failures.lock().pop_front();
        match next {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now_utc;

    fn ctx() -> PipelineContext {
        PipelineContext::forward("test", "tag", None, now_utc())
    }

    #[tokio::test]
    async fn test_scripted_extractor_fails_then_succeeds() {
        let extractor = ScriptedExtractor::ok(5_u32)
            .with_failures(2, PipelineFailure::transient("timeout"));
        let cancel = CancellationToken::new();

        assert!(Extractor::extract(&extractor, &cancel).await.unwrap_err().is_retryable());
        assert!(Extractor::extract(&extractor, &cancel).await.is_err());
        assert_eq!(Extractor::extract(&extractor, &cancel).await.unwrap(), 5);
        assert_eq!(extractor.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_extractor_never_yields() {
        let extractor = ScriptedExtractor::<u32>::failing(PipelineFailure::fatal("bad config"));
        let context = ctx();

        let err = ContextualExtractor::extract(&extractor, &context, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.failure_kind(), Some(FailureKind::Fatal));
        assert_eq!(extractor.seen_run_ids(), vec![context.run_id()]);
    }

    #[tokio::test]
    async fn test_recording_pipeline_scripted_failures() {
        let pipeline = RecordingPipeline::new("p").with_failures(1, FailureKind::Transient);
        let cancel = CancellationToken::new();

        assert!(pipeline.run(&ctx(), &cancel).await.is_err());
        assert!(pipeline.run(&ctx(), &cancel).await.is_ok());
        assert_eq!(pipeline.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_pipeline_delay_is_cancellable() {
        let pipeline = RecordingPipeline::new("slow").with_delay(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let context = ctx();

        let run = pipeline.run(&context, &cancel);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel("shutdown");
        };
        let (result, ()) = tokio::join!(run, stop);

        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_collecting_loader() {
        let loader = CollectingLoader::new();
        let cancel = CancellationToken::new();

        loader.load("a", &cancel).await.unwrap();
        loader.load("b", &cancel).await.unwrap();

        assert_eq!(loader.loaded(), vec!["a", "b"]);
    }
}
