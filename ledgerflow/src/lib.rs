//! # Ledgerflow
//!
//! An incremental extract→transform→load engine that keeps an append-only
//! history of what changed at each source.
//!
//! Ledgerflow provides:
//!
//! - **Watermarked windows**: each run covers `[last committed watermark, now)`
//!   and the watermark only moves after a successful run
//! - **Classified retry**: transient failures are retried with exponential
//!   backoff; permanent and fatal failures surface immediately
//! - **Deduplicating append logs**: records are written to NDJSON only when
//!   their fingerprint differs from the last one seen for their identity key
//! - **Scheduling**: manual, on-startup and interval policies driven by a
//!   cooperative cancellation token
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ledgerflow::prelude::*;
//!
//! let sink = Arc::new(DedupingAppendSink::new("data"));
//! let loader = DedupingLoader::new(sink, "consensus", |q: &Quote| q.game_id.clone(), |q: &Quote| {
//!     fingerprint_of([q.spread.to_string(), q.bets.to_string()])
//! });
//!
//! let pipeline = EtlPipeline::builder("consensus")
//!     .contextual_extractor(Arc::new(ConsensusExtractor::new()))
//!     .loader(Arc::new(loader))
//!     .build()?;
//!
//! let runner = PipelineRunner::new(
//!     PipelineRegistry::new().with(Arc::new(pipeline)),
//!     Arc::new(FileWatermarkStore::new("data/watermarks.json")),
//! );
//! let outcome = runner.run("consensus", &CancellationToken::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod runner;
pub mod schedule;
pub mod sink;
pub mod testing;
pub mod utils;
pub mod watermark;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::WorkerConfig;
    pub use crate::context::PipelineContext;
    pub use crate::errors::{
        ConfigurationError, FailureKind, PipelineError, PipelineFailure, SinkError,
        StorageError,
    };
    pub use crate::observability::{init_tracing, LogConfig, PipelineMetrics};
    pub use crate::pipeline::{
        ContextualExtractor, EtlPipeline, Extractor, FnTransformer, Loader, Pipeline,
        PipelineRegistry, RetryConfig, RetryPolicy, Transformer,
    };
    pub use crate::runner::{PipelineRunner, RunOutcome};
    pub use crate::schedule::{ExecutionPolicy, PipelineSchedule, Scheduler};
    pub use crate::sink::{
        fingerprint_of, sha256_hex, AppendOptions, DedupingAppendSink, DedupingLoader,
    };
    pub use crate::utils::{Clock, SystemClock, Timestamp};
    pub use crate::watermark::{FileWatermarkStore, InMemoryWatermarkStore, WatermarkStore};
}
