//! Day-partitioned loader backed by [`DedupingAppendSink`].

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::append::{AppendOptions, DedupingAppendSink};
use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;
use crate::pipeline::Loader;
use crate::utils::{partition_day, Clock, SystemClock};

/// Derives a string from a record (identity key or fingerprint).
pub type RecordKeyFn<R> = Arc<dyn Fn(&R) -> String + Send + Sync>;

/// Loads batches of records into `<base_dir>/<yyyy-MM-dd>.ndjson`, keeping
/// the fingerprint index in `<base_dir>/<yyyy-MM-dd>.index.json`.
///
/// The partition day comes from the loader's clock at load time.
pub struct DedupingLoader<R> {
    sink: Arc<DedupingAppendSink>,
    base_dir: PathBuf,
    identity_key: RecordKeyFn<R>,
    fingerprint: RecordKeyFn<R>,
    clock: Arc<dyn Clock>,
    options: AppendOptions,
}

impl<R> DedupingLoader<R> {
    /// Creates a loader writing under `base_dir` relative to the sink's root.
    ///
    /// The day's log is created even when a batch contains no changes.
    pub fn new(
        sink: Arc<DedupingAppendSink>,
        base_dir: impl Into<PathBuf>,
        identity_key: impl Fn(&R) -> String + Send + Sync + 'static,
        fingerprint: impl Fn(&R) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            sink,
            base_dir: base_dir.into(),
            identity_key: Arc::new(identity_key),
            fingerprint: Arc::new(fingerprint),
            clock: Arc::new(SystemClock),
            options: AppendOptions::default().with_ensure_log_exists(true),
        }
    }

    /// Replaces the clock used to pick the partition day.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the append options.
    #[must_use]
    pub fn with_options(mut self, options: AppendOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the log and index paths for a `yyyy-MM-dd` partition.
    #[must_use]
    pub fn partition_paths(&self, day: &str) -> (PathBuf, PathBuf) {
        (
            self.base_dir.join(format!("{day}.ndjson")),
            self.base_dir.join(format!("{day}.index.json")),
        )
    }
}

impl<R> std::fmt::Debug for DedupingLoader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupingLoader")
            .field("base_dir", &self.base_dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R> Loader<Vec<R>> for DedupingLoader<R>
where
    R: Serialize + Send + Sync + 'static,
{
    async fn load(&self, records: Vec<R>, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let day = partition_day(&self.clock.now());
        let (log, index) = self.partition_paths(&day);

        let appended = self
            .sink
            .append(
                &log,
                &index,
                &records,
                &*self.identity_key,
                &*self.fingerprint,
                self.options,
                cancel,
            )
            .await?;

        info!(
            partition = %day,
            received = records.len(),
            appended,
            "Loaded partition"
        );
        Ok(())
    }
}
