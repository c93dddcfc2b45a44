//! Idempotent, change-only NDJSON appender.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use super::index::FingerprintIndex;
use crate::cancellation::CancellationToken;
use crate::errors::SinkError;

/// Per-call append behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Create an empty log file when no record is appended.
    pub ensure_log_exists: bool,
}

impl AppendOptions {
    /// Sets `ensure_log_exists`.
    #[must_use]
    pub fn with_ensure_log_exists(mut self, ensure: bool) -> Self {
        self.ensure_log_exists = ensure;
        self
    }
}

/// Appends only new or changed records to an NDJSON log.
///
/// Change detection uses a companion index that maps each identity key to
/// the fingerprint last written for it. Re-running a batch whose records
/// have already been appended writes nothing.
///
/// A log/index pair must have a single writer at a time.
#[derive(Debug, Clone)]
pub struct DedupingAppendSink {
    data_root: PathBuf,
}

impl DedupingAppendSink {
    /// Creates a sink that resolves relative paths against `data_root`.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// Returns the directory relative paths resolve against.
    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Resolves `path` against the data root. Absolute paths are kept.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }

    /// Appends every record whose fingerprint differs from the one recorded
    /// for its identity key, then rewrites the index.
    ///
    /// Returns the number of records appended. Appended lines are flushed on
    /// every exit path; the index is only rewritten when the whole batch was
    /// processed and at least one record was appended.
    ///
    /// # Errors
    ///
    /// - [`SinkError::MissingPath`] if either path is empty.
    /// - [`SinkError::BlankIdentityKey`] when a record yields a blank key.
    ///   Records before it stay in the log.
    /// - [`SinkError::Cancelled`] when `cancel` fires mid-batch.
    /// - [`SinkError::CorruptIndex`], [`SinkError::Io`] or
    ///   [`SinkError::Serialization`] on storage failures.
    #[allow(clippy::too_many_arguments)]
    pub async fn append<R, I, F>(
        &self,
        log_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        records: &[R],
        identity_key: I,
        fingerprint: F,
        options: AppendOptions,
        cancel: &CancellationToken,
    ) -> Result<usize, SinkError>
    where
        R: Serialize,
        I: Fn(&R) -> String,
        F: Fn(&R) -> String,
    {
        let log_path = log_path.as_ref();
        let index_path = index_path.as_ref();
        if log_path.as_os_str().is_empty() {
            return Err(SinkError::MissingPath { which: "log" });
        }
        if index_path.as_os_str().is_empty() {
            return Err(SinkError::MissingPath { which: "index" });
        }

        let log = self.resolve(log_path);
        let index_file = self.resolve(index_path);
        create_parent(&log).await?;
        create_parent(&index_file).await?;

        info!(
            log = %log.display(),
            index = %index_file.display(),
            records = records.len(),
            "Appending changes"
        );

        let mut index = FingerprintIndex::load(&index_file).await?;
        let known_before = index.len();

        let mut writer = LogWriter::new(&log);
        let outcome = write_changes(
            &mut writer,
            records,
            &mut index,
            &identity_key,
            &fingerprint,
            cancel,
        )
        .await;
        let flushed = writer.finish().await;

        let appended = outcome?;
        flushed?;

        if appended > 0 {
            index.persist(&index_file).await?;
            info!(
                appended,
                new_keys = index.len() - known_before,
                log = %log.display(),
                "Appended changed records"
            );
        } else {
            if options.ensure_log_exists {
                touch(&log).await?;
            }
            info!(log = %log.display(), "No changes to append");
        }

        log_file_size(&log).await;
        Ok(appended)
    }
}

async fn write_changes<R, I, F>(
    writer: &mut LogWriter<'_>,
    records: &[R],
    index: &mut FingerprintIndex,
    identity_key: &I,
    fingerprint: &F,
    cancel: &CancellationToken,
) -> Result<usize, SinkError>
where
    R: Serialize,
    I: Fn(&R) -> String,
    F: Fn(&R) -> String,
{
    let mut appended = 0;

    for (position, record) in records.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(SinkError::Cancelled { appended });
        }

        let key = identity_key(record);
        if key.trim().is_empty() {
            return Err(SinkError::BlankIdentityKey { position, appended });
        }

        let print = fingerprint(record);
        if index.is_unchanged(&key, &print) {
            continue;
        }

        let line = serde_json::to_vec(record)?;
        writer.write_line(&line).await?;
        index.record(key, print);
        appended += 1;
    }

    Ok(appended)
}

/// Buffered log writer that opens the file on first write.
struct LogWriter<'a> {
    path: &'a Path,
    inner: Option<BufWriter<File>>,
}

impl<'a> LogWriter<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, inner: None }
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<(), SinkError> {
        let writer = match self.inner.take() {
            Some(writer) => writer,
            None => BufWriter::new(open_append(self.path).await?),
        };
        let writer = self.inner.insert(writer);

        writer
            .write_all(line)
            .await
            .map_err(|e| SinkError::io(self.path, e))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| SinkError::io(self.path, e))
    }

    async fn finish(mut self) -> Result<(), SinkError> {
        let Some(mut writer) = self.inner.take() else {
            return Ok(());
        };

        writer
            .flush()
            .await
            .map_err(|e| SinkError::io(self.path, e))?;
        writer
            .get_mut()
            .sync_data()
            .await
            .map_err(|e| SinkError::io(self.path, e))
    }
}

async fn open_append(path: &Path) -> Result<File, SinkError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| SinkError::io(path, e))
}

async fn touch(path: &Path) -> Result<(), SinkError> {
    open_append(path).await.map(drop)
}

async fn create_parent(path: &Path) -> Result<(), SinkError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SinkError::io(parent, e)),
        None => Ok(()),
    }
}

async fn log_file_size(path: &Path) {
    match tokio::fs::metadata(path).await {
        Ok(meta) => debug!(log = %path.display(), bytes = meta.len(), "Log file size"),
        Err(_) => debug!(log = %path.display(), "Log file not created"),
    }
}
