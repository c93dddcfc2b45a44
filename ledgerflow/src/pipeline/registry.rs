//! Registry of named pipelines.

use std::sync::Arc;

use super::interfaces::Pipeline;
use crate::errors::ConfigurationError;

/// The set of pipelines a runner can execute, composed explicitly at startup.
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    pipelines: Vec<Arc<dyn Pipeline>>,
}

impl PipelineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pipeline.
    ///
    /// Duplicate names are accepted here and rejected at resolution time.
    pub fn register(&mut self, pipeline: Arc<dyn Pipeline>) -> &mut Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Adds a pipeline, builder style.
    #[must_use]
    pub fn with(mut self, pipeline: Arc<dyn Pipeline>) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Returns the registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name()).collect()
    }

    /// Returns the number of registered pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Resolves exactly one pipeline by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownPipeline`] when nothing matches and
    /// [`ConfigurationError::AmbiguousPipeline`] when several do.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Pipeline>, ConfigurationError> {
        let mut matches = self.pipelines.iter().filter(|p| p.name() == name);

        match (matches.next(), matches.count()) {
            (None, _) => Err(ConfigurationError::UnknownPipeline {
                name: name.to_string(),
            }),
            (Some(pipeline), 0) => Ok(Arc::clone(pipeline)),
            (Some(_), rest) => Err(ConfigurationError::AmbiguousPipeline {
                name: name.to_string(),
                count: rest + 1,
            }),
        }
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.names())
            .finish()
    }
}
