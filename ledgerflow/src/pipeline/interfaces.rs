//! Capability interfaces for pipeline steps.
//!
//! Each step of an extract→transform→load pipeline is a single-method trait,
//! so adapters implement only what they provide. Site-specific fetching,
//! parsing and field mapping live behind these traits.

use async_trait::async_trait;

use crate::cancellation::CancellationToken;
use crate::context::PipelineContext;
use crate::errors::PipelineError;

/// A pipeline: a named unit that performs one run for a given context.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Returns the unique name of the pipeline.
    fn name(&self) -> &str;

    /// Performs one run.
    ///
    /// Returning a transient failure lets the runner retry the whole run.
    async fn run(
        &self,
        ctx: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError>;
}

/// Pulls raw data from a source without regard to the run window.
#[async_trait]
pub trait Extractor<T>: Send + Sync {
    /// Extracts the raw payload.
    async fn extract(&self, cancel: &CancellationToken) -> Result<T, PipelineError>;
}

/// Pulls raw data for the window described by the run context.
#[async_trait]
pub trait ContextualExtractor<T>: Send + Sync {
    /// Extracts the raw payload for `ctx`.
    async fn extract(
        &self,
        ctx: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<T, PipelineError>;
}

/// A pure value-to-value step applied between extraction and load.
#[async_trait]
pub trait Transformer<T>: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Transforms one value.
    async fn transform(&self, value: T, cancel: &CancellationToken) -> Result<T, PipelineError>;
}

/// The terminal step of a pipeline.
#[async_trait]
pub trait Loader<T>: Send + Sync {
    /// Persists or emits the value.
    async fn load(&self, value: T, cancel: &CancellationToken) -> Result<(), PipelineError>;
}
