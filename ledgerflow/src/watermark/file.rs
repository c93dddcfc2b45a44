//! JSON-file watermark store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::WatermarkStore;
use crate::errors::StorageError;
use crate::utils::fs::write_atomic;
use crate::utils::{format_iso8601, Timestamp};

type WatermarkMap = BTreeMap<String, Timestamp>;

/// Watermark store persisted as a single JSON object mapping pipeline name to
/// an ISO-8601 UTC timestamp.
///
/// The file is rewritten wholesale on every save, through a temp file and an
/// atomic rename. A missing file reads as "no watermarks"; an unreadable or
/// undecodable file is an error.
#[derive(Debug)]
pub struct FileWatermarkStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles from different pipelines.
    write_lock: Mutex<()>,
}

impl FileWatermarkStore {
    /// Creates a store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<WatermarkMap, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WatermarkMap::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let entries: Option<WatermarkMap> =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(entries.unwrap_or_default())
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn get(&self, pipeline_name: &str) -> Result<Option<Timestamp>, StorageError> {
        Ok(self.read_all().await?.get(pipeline_name).copied())
    }

    async fn save(&self, pipeline_name: &str, watermark: Timestamp) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_all().await?;
        entries.insert(pipeline_name.to_string(), watermark);

        let json = serde_json::to_vec_pretty(&entries).map_err(StorageError::Encode)?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            pipeline = %pipeline_name,
            watermark = %format_iso8601(&watermark),
            path = %self.path.display(),
            "Watermark committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ts(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 2, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermarks.json"));

        assert_eq!(store.get("p1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_get_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("watermarks.json");

        FileWatermarkStore::new(&path).save("p1", ts(3)).await.unwrap();

        let reopened = FileWatermarkStore::new(&path);
        assert_eq!(reopened.get("p1").await.unwrap(), Some(ts(3)));
    }

    #[tokio::test]
    async fn test_save_preserves_other_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermarks.json"));

        store.save("p1", ts(1)).await.unwrap();
        store.save("p2", ts(2)).await.unwrap();
        store.save("p1", ts(4)).await.unwrap();

        assert_eq!(store.get("p1").await.unwrap(), Some(ts(4)));
        assert_eq!(store.get("p2").await.unwrap(), Some(ts(2)));
    }

    #[tokio::test]
    async fn test_file_format_is_iso8601_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        let store = FileWatermarkStore::new(&path);

        store.save("p1", ts(5)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["p1"], "2024-02-05T12:00:00Z");
    }

    #[tokio::test]
    async fn test_accepts_offset_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        std::fs::write(&path, r#"{"p1": "2024-02-05T12:00:00+00:00"}"#).unwrap();

        let store = FileWatermarkStore::new(&path);
        assert_eq!(store.get("p1").await.unwrap(), Some(ts(5)));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileWatermarkStore::new(&path);
        let err = store.get("p1").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));

        let err = store.save("p1", ts(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_null_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        std::fs::write(&path, "null").unwrap();

        let store = FileWatermarkStore::new(&path);
        assert_eq!(store.get("p1").await.unwrap(), None);

        store.save("p1", ts(2)).await.unwrap();
        assert_eq!(store.get("p1").await.unwrap(), Some(ts(2)));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be.
        let store = FileWatermarkStore::new(dir.path());

        let err = store.get("p1").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
