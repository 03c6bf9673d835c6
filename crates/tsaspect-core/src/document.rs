//! Content-derived document identity.
//!
//! A document ID is the lowercase hex SHA-256 digest of the document's
//! canonical serialization. The canonical form is compact JSON with object
//! keys in sorted order, which is what `serde_json` produces for a
//! `serde_json::Value` when the `preserve_order` feature is off. Both the
//! algorithm and the canonical form are part of the stored-data contract:
//! changing either changes every ID and breaks upsert deduplication.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TimeseriesError;

/// Stable identifier of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Length of every document ID, in characters.
    pub const LEN: usize = 64;

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the document ID for already-serialized payload bytes.
#[must_use]
pub fn compute_id(serialized_payload: &[u8]) -> DocumentId {
    DocumentId(hex::encode(Sha256::digest(serialized_payload)))
}

/// A document in canonical wire form together with its ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDocument {
    /// Content-derived identifier.
    pub id: DocumentId,
    /// Canonical JSON body.
    pub body: String,
}

/// Serializes `document` canonically and derives its ID.
///
/// # Errors
///
/// Returns `TimeseriesError::Serialization` if `document` cannot be
/// represented as JSON (for example a map with non-string keys).
pub fn canonicalize<T>(document: &T) -> Result<CanonicalDocument, TimeseriesError>
where
    T: Serialize + ?Sized,
{
    // Going through `Value` sorts object keys regardless of the input's
    // field or insertion order.
    let value = serde_json::to_value(document)
        .map_err(|e| TimeseriesError::Serialization(e.to_string()))?;
    let body =
        serde_json::to_string(&value).map_err(|e| TimeseriesError::Serialization(e.to_string()))?;
    let id = compute_id(body.as_bytes());
    Ok(CanonicalDocument { id, body })
}
