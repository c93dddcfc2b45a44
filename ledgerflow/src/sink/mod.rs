//! Idempotent append sink.
//!
//! Records are appended to newline-delimited JSON logs only when their
//! fingerprint differs from the last one recorded for their identity key.
//! The key → fingerprint index lives in a JSON file next to each log and is
//! replaced atomically after every successful batch.

mod append;
mod fingerprint;
mod index;
mod loader;

pub use append::{AppendOptions, DedupingAppendSink};
pub use fingerprint::{fingerprint_fields, fingerprint_of, sha256_hex};
pub use index::FingerprintIndex;
pub use loader::{DedupingLoader, RecordKeyFn};
