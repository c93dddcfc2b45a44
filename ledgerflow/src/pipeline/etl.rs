//! Composite extract→transform→load pipeline.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::interfaces::{ContextualExtractor, Extractor, Loader, Pipeline, Transformer};
use crate::cancellation::CancellationToken;
use crate::context::PipelineContext;
use crate::errors::{ConfigurationError, PipelineError};

/// How an [`EtlPipeline`] obtains its raw payload.
pub enum ExtractStep<T> {
    /// Ignores the run window.
    Plain(Arc<dyn Extractor<T>>),
    /// Receives the run context.
    Contextual(Arc<dyn ContextualExtractor<T>>),
}

impl<T> Clone for ExtractStep<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(e) => Self::Plain(Arc::clone(e)),
            Self::Contextual(e) => Self::Contextual(Arc::clone(e)),
        }
    }
}

/// A pipeline composed from an extractor, ordered transformers and a loader.
///
/// Cancellation is checked between every step.
pub struct EtlPipeline<T> {
    name: String,
    extract: ExtractStep<T>,
    transformers: Vec<Arc<dyn Transformer<T>>>,
    loader: Arc<dyn Loader<T>>,
}

impl<T> EtlPipeline<T> {
    /// Starts building a pipeline with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EtlPipelineBuilder<T> {
        EtlPipelineBuilder::new(name)
    }

    /// Returns the number of transform steps.
    #[must_use]
    pub fn transformer_count(&self) -> usize {
        self.transformers.len()
    }
}

impl<T> std::fmt::Debug for EtlPipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlPipeline")
            .field("name", &self.name)
            .field("transformers", &self.transformers.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Send + 'static> Pipeline for EtlPipeline<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        info!(pipeline = %self.name, "Pipeline execution started");
        cancel.error_if_cancelled()?;

        let mut current = match &self.extract {
            ExtractStep::Plain(extractor) => extractor.extract(cancel).await?,
            ExtractStep::Contextual(extractor) => extractor.extract(ctx, cancel).await?,
        };

        for transformer in &self.transformers {
            cancel.error_if_cancelled()?;
            debug!(pipeline = %self.name, transformer = transformer.name(), "Applying transformer");
            current = transformer.transform(current, cancel).await?;
        }

        cancel.error_if_cancelled()?;
        self.loader.load(current, cancel).await?;

        info!(pipeline = %self.name, "Pipeline execution finished");
        Ok(())
    }
}

/// Builder for [`EtlPipeline`].
pub struct EtlPipelineBuilder<T> {
    name: String,
    extract: Option<ExtractStep<T>>,
    transformers: Vec<Arc<dyn Transformer<T>>>,
    loader: Option<Arc<dyn Loader<T>>>,
}

impl<T> EtlPipelineBuilder<T> {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extract: None,
            transformers: Vec::new(),
            loader: None,
        }
    }

    /// Sets a window-agnostic extractor.
    #[must_use]
    pub fn extractor(mut self, extractor: Arc<dyn Extractor<T>>) -> Self {
        self.extract = Some(ExtractStep::Plain(extractor));
        self
    }

    /// Sets a context-aware extractor.
    #[must_use]
    pub fn contextual_extractor(mut self, extractor: Arc<dyn ContextualExtractor<T>>) -> Self {
        self.extract = Some(ExtractStep::Contextual(extractor));
        self
    }

    /// Appends a transformer. Transformers run in the order they are added.
    #[must_use]
    pub fn transformer(mut self, transformer: Arc<dyn Transformer<T>>) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Sets the loader.
    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn Loader<T>>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidPipeline`] when the name is blank
    /// or the extractor or loader is missing.
    pub fn build(self) -> Result<EtlPipeline<T>, ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidPipeline {
            pipeline: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("pipeline name is blank"));
        }
        let Some(extract) = self.extract.clone() else {
            return Err(invalid("no extractor configured"));
        };
        let Some(loader) = self.loader.clone() else {
            return Err(invalid("no loader configured"));
        };

        Ok(EtlPipeline {
            name: self.name,
            extract,
            transformers: self.transformers,
            loader,
        })
    }
}
