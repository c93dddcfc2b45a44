//! Per-pipeline watermark persistence.
//!
//! [`WatermarkStore`] defines the storage contract for the end of the last
//! successfully processed window, keyed by pipeline name.

mod file;
mod memory;

pub use file::FileWatermarkStore;
pub use memory::InMemoryWatermarkStore;

use async_trait::async_trait;

use crate::errors::StorageError;
use crate::utils::Timestamp;

/// Storage contract for pipeline watermarks.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn WatermarkStore>`.
/// The runner guarantees a single writer per pipeline name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Reads the committed watermark for a pipeline.
    ///
    /// Returns `Ok(None)` when no watermark has been committed yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing store is unreadable or
    /// corrupt. A watermark is never fabricated.
    async fn get(&self, pipeline_name: &str) -> Result<Option<Timestamp>, StorageError>;

    /// Durably commits a watermark for a pipeline before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on I/O failure.
    async fn save(&self, pipeline_name: &str, watermark: Timestamp) -> Result<(), StorageError>;
}
