//! In-memory watermark store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::WatermarkStore;
use crate::errors::StorageError;
use crate::utils::Timestamp;

/// Watermark store backed by a map. Not durable; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    entries: RwLock<HashMap<String, Timestamp>>,
}

impl InMemoryWatermarkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pipelines with a committed watermark.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no watermark has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn get(&self, pipeline_name: &str) -> Result<Option<Timestamp>, StorageError> {
        Ok(self.entries.read().get(pipeline_name).copied())
    }

    async fn save(&self, pipeline_name: &str, watermark: Timestamp) -> Result<(), StorageError> {
        self.entries
            .write()
            .insert(pipeline_name.to_string(), watermark);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryWatermarkStore::new();
        assert_eq!(store.get("p1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryWatermarkStore::new();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        store.save("p1", first).await.unwrap();
        store.save("p1", second).await.unwrap();

        assert_eq!(store.get("p1").await.unwrap(), Some(second));
        assert_eq!(store.len(), 1);
    }
}
