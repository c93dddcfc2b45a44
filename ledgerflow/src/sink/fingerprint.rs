//! Fingerprint helpers.
//!
//! A fingerprint summarizes the part of a record whose change is worth
//! recording. Two records with the same identity key and fingerprint are
//! treated as identical, so hash collisions are an accepted trade-off.

use sha2::{Digest, Sha256};

/// Returns the upper-case hex SHA-256 digest of `input`.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    hex::encode_upper(Sha256::digest(input.as_bytes()))
}

/// Fingerprints an ordered list of field renderings joined with `|`.
#[must_use]
pub fn fingerprint_of<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .map(|p| p.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(&joined)
}

/// Fingerprints the named top-level fields of a JSON object.
///
/// Missing fields render as `null`, so adding a field that is not listed
/// never changes the fingerprint.
#[must_use]
pub fn fingerprint_fields(value: &serde_json::Value, fields: &[&str]) -> String {
    fingerprint_of(fields.iter().map(|field| {
        value
            .get(*field)
            .map_or_else(|| "null".to_string(), serde_json::Value::to_string)
    }))
}
