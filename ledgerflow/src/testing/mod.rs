//! Testing utilities for ledgerflow pipelines.
//!
//! This module provides:
//! - Scripted extractors, loaders and pipelines that record their calls
//! - A manual clock for deterministic windows and partitions
//! - Helpers for reading NDJSON logs and checking failure classes

mod fixtures;
mod mocks;

pub use fixtures::{assert_failure_kind, fixed_time, read_ndjson, timestamp, ManualClock};
pub use mocks::{CollectingLoader, RecordingPipeline, ScriptedExtractor};
