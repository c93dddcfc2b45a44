//! Small ready-made step adapters.

use async_trait::async_trait;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::info;

use super::interfaces::{Loader, Transformer};
use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;

/// A function-based transformer.
pub struct FnTransformer<T, F>
where
    F: Fn(T) -> Result<T, PipelineError> + Send + Sync,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn(T) -> T>,
}

impl<T, F> FnTransformer<T, F>
where
    F: Fn(T) -> Result<T, PipelineError> + Send + Sync,
{
    /// Creates a new function-based transformer.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> Debug for FnTransformer<T, F>
where
    F: Fn(T) -> Result<T, PipelineError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransformer")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F> Transformer<T> for FnTransformer<T, F>
where
    T: Send + 'static,
    F: Fn(T) -> Result<T, PipelineError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(&self, value: T, _cancel: &CancellationToken) -> Result<T, PipelineError> {
        (self.func)(value)
    }
}

/// A loader that writes each value to the log at INFO.
#[derive(Debug, Clone)]
pub struct TracingLoader {
    label: String,
}

impl TracingLoader {
    /// Creates a loader that tags its log lines with `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl<T: Debug + Send + 'static> Loader<T> for TracingLoader {
    async fn load(&self, value: T, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        info!(loader = %self.label, value = ?value, "Loaded value");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineFailure;

    #[tokio::test]
    async fn test_fn_transformer() {
        let transformer = FnTransformer::new("double", |n: i64| Ok(n * 2));
        let cancel = CancellationToken::new();

        assert_eq!(transformer.name(), "double");
        assert_eq!(transformer.transform(21, &cancel).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_fn_transformer_propagates_failure() {
        let transformer = FnTransformer::new("reject", |_: String| {
            Err(PipelineFailure::permanent("unexpected shape").into())
        });

        let err = transformer
            .transform("x".to_string(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unexpected shape"));
    }

    #[tokio::test]
    async fn test_tracing_loader_accepts_any_debug_value() {
        let loader = TracingLoader::new("console");
        let cancel = CancellationToken::new();

        Loader::<Vec<u8>>::load(&loader, vec![1, 2, 3], &cancel).await.unwrap();
        Loader::<&'static str>::load(&loader, "hello", &cancel).await.unwrap();
    }
}
