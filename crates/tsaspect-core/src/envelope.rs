//! Decoding stored documents back into aspect envelopes.

use serde_json::Value;

use crate::backend::SearchHit;
use crate::error::TimeseriesError;
use crate::event::{EVENT_FIELD, SYSTEM_METADATA_FIELD, SystemMetadata};

/// Content type of every decoded aspect payload.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A serialized aspect payload tagged with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericAspect {
    /// Serialized payload.
    pub value: Vec<u8>,
    /// Content type of `value`.
    pub content_type: String,
}

impl GenericAspect {
    /// Parses the payload back into JSON.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::Decode` if the payload is not valid JSON.
    pub fn to_json(&self) -> Result<Value, TimeseriesError> {
        serde_json::from_slice(&self.value).map_err(|e| TimeseriesError::Decode(e.to_string()))
    }
}

/// An aspect payload together with its provenance metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopedAspect {
    /// The aspect payload.
    pub aspect: GenericAspect,
    /// Provenance metadata, if the document carried any.
    pub system_metadata: Option<SystemMetadata>,
}

/// Decodes one hit.
///
/// # Errors
///
/// Returns `TimeseriesError::Decode` if the stored document is not an object,
/// has no event payload, or carries metadata that does not fit
/// `SystemMetadata`.
pub fn decode_hit(hit: &SearchHit) -> Result<EnvelopedAspect, TimeseriesError> {
    let fields = hit.source.as_object().ok_or_else(|| {
        TimeseriesError::Decode(format!("document {} is not a JSON object", hit.id))
    })?;

    let event = fields.get(EVENT_FIELD).ok_or_else(|| {
        TimeseriesError::Decode(format!("document {} has no `{EVENT_FIELD}` field", hit.id))
    })?;
    let value = serde_json::to_vec(event).map_err(|e| {
        TimeseriesError::Decode(format!("failed to serialize event of document {}: {e}", hit.id))
    })?;

    let system_metadata = match fields.get(SYSTEM_METADATA_FIELD) {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<SystemMetadata>(raw.clone()).map_err(|e| {
                TimeseriesError::Decode(format!(
                    "invalid system metadata in document {}: {e}",
                    hit.id
                ))
            })?,
        ),
    };

    Ok(EnvelopedAspect {
        aspect: GenericAspect {
            value,
            content_type: JSON_CONTENT_TYPE.to_owned(),
        },
        system_metadata,
    })
}

/// Decodes every hit, preserving order. One bad hit fails the whole set.
///
/// # Errors
///
/// Returns the first `TimeseriesError::Decode` encountered.
pub fn decode_hits(hits: &[SearchHit]) -> Result<Vec<EnvelopedAspect>, TimeseriesError> {
    hits.iter().map(decode_hit).collect()
}
