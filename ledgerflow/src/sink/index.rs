//! Identity key → fingerprint index persisted next to an append log.

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::SinkError;
use crate::utils::fs::write_atomic;

/// The last fingerprint recorded for every identity key ever appended.
///
/// Grows with the number of distinct identity keys, not with run count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintIndex {
    entries: BTreeMap<String, String>,
}

impl FingerprintIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the index from `path`.
    ///
    /// A missing, empty or `null` file is an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] when the file cannot be read and
    /// [`SinkError::CorruptIndex`] when it cannot be decoded.
    pub async fn load(path: &Path) -> Result<Self, SinkError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(SinkError::io(path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }

        let parsed: Option<BTreeMap<String, String>> =
            serde_json::from_slice(&bytes).map_err(|source| SinkError::CorruptIndex {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            entries: parsed.unwrap_or_default(),
        })
    }

    /// Rewrites the whole index at `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] on encoding or I/O failure; the previous file is
    /// left intact in that case.
    pub async fn persist(&self, path: &Path) -> Result<(), SinkError> {
        let json = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(path, &json)
            .await
            .map_err(|e| SinkError::io(path, e))
    }

    /// Returns the recorded fingerprint for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true when `key` is recorded with exactly `fingerprint`.
    #[must_use]
    pub fn is_unchanged(&self, key: &str, fingerprint: &str) -> bool {
        self.get(key) == Some(fingerprint)
    }

    /// Records the latest fingerprint for `key`.
    pub fn record(&mut self, key: String, fingerprint: String) {
        self.entries.insert(key, fingerprint);
    }

    /// Returns the number of identity keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
