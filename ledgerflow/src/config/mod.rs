//! Worker configuration.
//!
//! A worker is configured from a JSON document; every field has a default,
//! so an empty object is a valid configuration. A few settings can be
//! overridden from the environment:
//!
//! - `LEDGERFLOW_DATA_ROOT`: directory append logs resolve against
//! - `LEDGERFLOW_WATERMARK_FILE`: watermark file path
//! - `LEDGERFLOW_LOG_JSON`: `true`/`false`, JSON log output

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::errors::ConfigurationError;
use crate::observability::LogConfig;
use crate::pipeline::{RetryConfig, RetryPolicy};
use crate::schedule::PipelineSchedule;
use crate::sink::DedupingAppendSink;
use crate::watermark::FileWatermarkStore;

/// Environment variable overriding [`WorkerConfig::data_root`].
pub const ENV_DATA_ROOT: &str = "LEDGERFLOW_DATA_ROOT";
/// Environment variable overriding [`WorkerConfig::watermark_file`].
pub const ENV_WATERMARK_FILE: &str = "LEDGERFLOW_WATERMARK_FILE";
/// Environment variable overriding [`LogConfig::json`].
pub const ENV_LOG_JSON: &str = "LEDGERFLOW_LOG_JSON";

/// Top-level worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Root directory for append logs and indexes.
    pub data_root: PathBuf,
    /// Watermark file; relative paths resolve against `data_root`.
    pub watermark_file: PathBuf,
    /// Domain tag stamped on every run context.
    pub domain_tag: String,
    /// Retry settings shared by every pipeline.
    pub retry: RetryConfig,
    /// Logging settings.
    pub logging: LogConfig,
    /// Schedule entries.
    pub pipelines: Vec<PipelineSchedule>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            watermark_file: PathBuf::from("watermarks.json"),
            domain_tag: "default".to_string(),
            retry: RetryConfig::default(),
            logging: LogConfig::default(),
            pipelines: Vec::new(),
        }
    }
}

impl WorkerConfig {
    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid configuration JSON.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse worker configuration")
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("in config file '{}'", path.display()))
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is present but malformed.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides using `lookup` in place of the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is present but malformed.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_DATA_ROOT).filter(|v| !v.trim().is_empty()) {
            self.data_root = PathBuf::from(root);
        }
        if let Some(file) = lookup(ENV_WATERMARK_FILE).filter(|v| !v.trim().is_empty()) {
            self.watermark_file = PathBuf::from(file);
        }
        if let Some(raw) = lookup(ENV_LOG_JSON) {
            self.logging.json = parse_bool(&raw)
                .with_context(|| format!("invalid {ENV_LOG_JSON}"))?;
        }
        Ok(())
    }

    /// Checks the schedule entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSchedule`] for a blank name, a
    /// `Scheduled` entry without a positive interval, or a pipeline listed
    /// more than once.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();
        for schedule in &self.pipelines {
            schedule.validate()?;
            if !seen.insert(schedule.pipeline_name.as_str()) {
                return Err(ConfigurationError::invalid_schedule(
                    &schedule.pipeline_name,
                    "pipeline is scheduled more than once",
                ));
            }
        }
        Ok(())
    }

    /// Returns the resolved watermark file path.
    #[must_use]
    pub fn watermark_path(&self) -> PathBuf {
        if self.watermark_file.is_absolute() {
            self.watermark_file.clone()
        } else {
            self.data_root.join(&self.watermark_file)
        }
    }

    /// Builds the file watermark store.
    #[must_use]
    pub fn watermark_store(&self) -> FileWatermarkStore {
        FileWatermarkStore::new(self.watermark_path())
    }

    /// Builds the append sink rooted at `data_root`.
    #[must_use]
    pub fn sink(&self) -> DedupingAppendSink {
        DedupingAppendSink::new(&self.data_root)
    }

    /// Builds the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.clone())
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}
