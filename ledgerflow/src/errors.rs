//! Error types for the ledgerflow runtime.
//!
//! Every failure that reaches the runner carries one of three classifications
//! (see [`FailureKind`]). Only transient failures are retried; everything else
//! propagates to the caller on the first occurrence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed source error carried by a [`PipelineFailure`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network hiccups, rate limiting, temporary I/O. Retryable.
    Transient,
    /// Missing resource, schema drift, bad input. Needs a fix.
    Permanent,
    /// Invariant violation or programming defect.
    Fatal,
}

impl FailureKind {
    /// Returns the lowercase name of the classification.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Fatal => "fatal",
        }
    }

    /// Returns true if failures of this kind may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure raised by an extractor, transformer, loader or pipeline.
#[derive(Debug, Error)]
#[error("{kind} failure: {message}")]
pub struct PipelineFailure {
    /// The failure classification.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
    /// The underlying cause, if any.
    #[source]
    pub source: Option<BoxError>,
}

impl PipelineFailure {
    /// Creates a new failure with the given classification.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transient (retryable) failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    /// Creates a permanent failure.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Configuration and validation errors. These always behave as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No registered pipeline matches the requested name.
    #[error("No pipeline registered with name '{name}'")]
    UnknownPipeline {
        /// The requested pipeline name.
        name: String,
    },

    /// More than one registered pipeline matches the requested name.
    #[error("{count} pipelines registered with name '{name}'")]
    AmbiguousPipeline {
        /// The requested pipeline name.
        name: String,
        /// How many pipelines matched.
        count: usize,
    },

    /// The run window failed validation.
    #[error("Invalid window for pipeline '{pipeline}': {reason}")]
    InvalidWindow {
        /// The pipeline name.
        pipeline: String,
        /// Why the window was rejected.
        reason: String,
    },

    /// A run for this pipeline is already executing.
    #[error("Pipeline '{name}' already has a run in flight")]
    RunInProgress {
        /// The pipeline name.
        name: String,
    },

    /// A pipeline definition is incomplete or inconsistent.
    #[error("Invalid pipeline definition '{pipeline}': {reason}")]
    InvalidPipeline {
        /// The pipeline name.
        pipeline: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A schedule entry is invalid.
    #[error("Invalid schedule for pipeline '{pipeline}': {reason}")]
    InvalidSchedule {
        /// The pipeline name.
        pipeline: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid window error.
    #[must_use]
    pub fn invalid_window(pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidWindow {
            pipeline: pipeline.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid schedule error.
    #[must_use]
    pub fn invalid_schedule(pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            pipeline: pipeline.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced by a watermark store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("i/o error on watermark store '{}': {source}", path.display())]
    Io {
        /// The backing file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The backing file exists but cannot be decoded.
    #[error("corrupt watermark store '{}': {source}", path.display())]
    Corrupt {
        /// The backing file.
        path: PathBuf,
        /// The decoding error.
        source: serde_json::Error,
    },

    /// Encoding the watermark map failed.
    #[error("failed to encode watermarks: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors produced by the deduplicating append sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A record produced a blank identity key. The rest of the batch is skipped.
    #[error("identity key is blank for record at position {position}")]
    BlankIdentityKey {
        /// Zero-based position of the offending record.
        position: usize,
        /// Records appended before the offending one.
        appended: usize,
    },

    /// A sink path was empty.
    #[error("{which} path is required")]
    MissingPath {
        /// Which path ("log" or "index").
        which: &'static str,
    },

    /// Reading or writing the log or index failed.
    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The index file exists but cannot be decoded.
    #[error("corrupt index '{}': {source}", path.display())]
    CorruptIndex {
        /// The index file.
        path: PathBuf,
        /// The decoding error.
        source: serde_json::Error,
    },

    /// A record or the index could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cancellation was observed mid-batch.
    #[error("append cancelled after {appended} record(s)")]
    Cancelled {
        /// Records appended before cancellation.
        appended: usize,
    },
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The top-level error type returned by pipelines, the runner and the scheduler.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A classified failure raised by pipeline code.
    #[error(transparent)]
    Failure(#[from] PipelineFailure),

    /// A configuration or validation error.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The watermark store failed.
    #[error("Watermark storage error: {0}")]
    Storage(#[from] StorageError),

    /// The append sink failed.
    #[error("Sink error: {0}")]
    Sink(SinkError),

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),
}

impl From<SinkError> for PipelineError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Cancelled { appended } => {
                Self::Cancelled(format!("sink stopped after {appended} record(s)"))
            }
            other => Self::Sink(other),
        }
    }
}

impl PipelineError {
    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Returns the classification of this error, or `None` for cancellation.
    ///
    /// Configuration and sink validation errors are fatal. Storage and sink
    /// I/O errors are permanent: a blind retry of a half-written batch would
    /// re-append the lines whose index update was lost.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure(failure) => Some(failure.kind),
            Self::Configuration(_) => Some(FailureKind::Fatal),
            Self::Storage(_) => Some(FailureKind::Permanent),
            Self::Sink(SinkError::BlankIdentityKey { .. } | SinkError::MissingPath { .. }) => {
                Some(FailureKind::Fatal)
            }
            Self::Sink(_) => Some(FailureKind::Permanent),
            Self::Cancelled(_) => None,
        }
    }

    /// Returns true if the retry policy may retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_some_and(FailureKind::is_retryable)
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Converts to a dictionary representation for structured logging.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = self
            .failure_kind()
            .map_or("cancelled", FailureKind::as_str);
        map.insert("kind".to_string(), serde_json::json!(kind));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_constructors_carry_kind() {
        assert_eq!(PipelineFailure::transient("x").kind, FailureKind::Transient);
        assert_eq!(PipelineFailure::permanent("x").kind, FailureKind::Permanent);
        assert_eq!(PipelineFailure::fatal("x").kind, FailureKind::Fatal);
    }

    #[test]
    fn test_failure_display_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let failure = PipelineFailure::transient("fetch failed").with_source(io);

        assert_eq!(failure.to_string(), "transient failure: fetch failed");
        let source = std::error::Error::source(&failure).unwrap();
        assert!(source.to_string().contains("timed out"));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        let transient: PipelineError = PipelineFailure::transient("429").into();
        let permanent: PipelineError = PipelineFailure::permanent("404").into();
        let fatal: PipelineError = PipelineFailure::fatal("bug").into();

        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err: PipelineError = ConfigurationError::UnknownPipeline {
            name: "p1".to_string(),
        }
        .into();

        assert_eq!(err.failure_kind(), Some(FailureKind::Fatal));
        assert!(err.to_string().contains("p1"));
    }

    #[test]
    fn test_blank_identity_is_fatal_and_io_is_permanent() {
        let blank: PipelineError = SinkError::BlankIdentityKey {
            position: 2,
            appended: 1,
        }
        .into();
        let io: PipelineError = SinkError::io(
            "log.ndjson",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        )
        .into();

        assert_eq!(blank.failure_kind(), Some(FailureKind::Fatal));
        assert_eq!(io.failure_kind(), Some(FailureKind::Permanent));
    }

    #[test]
    fn test_sink_cancellation_maps_to_cancelled() {
        let err: PipelineError = SinkError::Cancelled { appended: 3 }.into();

        assert!(err.is_cancelled());
        assert_eq!(err.failure_kind(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_to_dict() {
        let err: PipelineError = PipelineFailure::permanent("schema drift").into();
        let dict = err.to_dict();

        assert_eq!(dict.get("kind").unwrap(), "permanent");
        assert_eq!(dict.get("retryable").unwrap(), false);

        let cancelled = PipelineError::cancelled("shutdown").to_dict();
        assert_eq!(cancelled.get("kind").unwrap(), "cancelled");
    }

    #[test]
    fn test_failure_kind_serde() {
        let json = serde_json::to_string(&FailureKind::Transient).unwrap();
        assert_eq!(json, "\"transient\"");
    }
}
