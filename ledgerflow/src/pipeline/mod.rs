//! Pipeline building and execution.
//!
//! This module provides:
//! - Capability traits for extractors, transformers and loaders
//! - A composite ETL pipeline and its builder
//! - The registry the runner resolves pipelines from
//! - Failure-classified retry with exponential backoff

mod adapters;
mod etl;
mod interfaces;
mod registry;
mod retry;

pub use adapters::{FnTransformer, TracingLoader};
pub use etl::{EtlPipeline, EtlPipelineBuilder, ExtractStep};
pub use interfaces::{ContextualExtractor, Extractor, Loader, Pipeline, Transformer};
pub use registry::PipelineRegistry;
pub use retry::{
    should_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryPolicy,
};
