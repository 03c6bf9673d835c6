//! Time-series events and their stored document layout.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TimeseriesError;
use crate::projection::ProjectionRegistry;

/// Document field holding the entity reference.
pub const URN_FIELD: &str = "urn";
/// Document field used for both range filtering and recency sort.
pub const TIMESTAMP_FIELD: &str = "timestampMillis";
/// Document field holding the original event payload.
pub const EVENT_FIELD: &str = "event";
/// Document field holding optional provenance metadata.
pub const SYSTEM_METADATA_FIELD: &str = "systemMetadata";

/// Keys that projections may not overwrite.
pub const RESERVED_FIELDS: [&str; 4] = [
    URN_FIELD,
    TIMESTAMP_FIELD,
    EVENT_FIELD,
    SYSTEM_METADATA_FIELD,
];

/// Provenance metadata attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    /// When the fact was last observed at its source, in epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed: Option<i64>,
    /// Ingestion run that produced the fact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Free-form string properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
    /// Any additional fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A point-in-time fact about an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesEvent {
    /// Opaque entity reference.
    pub entity_urn: String,
    /// Event time in milliseconds since the Unix epoch.
    pub timestamp_millis: i64,
    /// Event payload.
    pub event: Value,
    /// Optional provenance metadata.
    pub system_metadata: Option<SystemMetadata>,
}

impl TimeseriesEvent {
    /// Creates an event without provenance metadata.
    #[must_use]
    pub fn new(entity_urn: impl Into<String>, timestamp_millis: i64, event: Value) -> Self {
        Self {
            entity_urn: entity_urn.into(),
            timestamp_millis,
            event,
            system_metadata: None,
        }
    }

    /// Creates an event stamped with `timestamp`.
    #[must_use]
    pub fn from_datetime(
        entity_urn: impl Into<String>,
        timestamp: DateTime<Utc>,
        event: Value,
    ) -> Self {
        Self::new(entity_urn, timestamp.timestamp_millis(), event)
    }

    /// Attaches provenance metadata.
    #[must_use]
    pub fn with_system_metadata(mut self, system_metadata: SystemMetadata) -> Self {
        self.system_metadata = Some(system_metadata);
        self
    }

    /// Renders the stored document layout.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::Serialization` if the system metadata
    /// cannot be rendered as JSON.
    pub fn to_document(&self) -> Result<Value, TimeseriesError> {
        self.base_document().map(Value::Object)
    }

    /// Renders the stored document layout with the projected fields for
    /// `aspect_type` merged in at the top level.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::Serialization` if the system metadata
    /// cannot be rendered as JSON.
    pub fn to_projected_document(
        &self,
        aspect_type: &str,
        registry: &ProjectionRegistry,
    ) -> Result<Value, TimeseriesError> {
        let mut document = self.base_document()?;
        for (key, value) in registry.project(aspect_type, &self.event) {
            if !RESERVED_FIELDS.contains(&key.as_str()) {
                document.insert(key, value);
            }
        }
        Ok(Value::Object(document))
    }

    fn base_document(&self) -> Result<Map<String, Value>, TimeseriesError> {
        let mut document = Map::new();
        document.insert(URN_FIELD.to_owned(), Value::String(self.entity_urn.clone()));
        document.insert(TIMESTAMP_FIELD.to_owned(), Value::from(self.timestamp_millis));
        document.insert(EVENT_FIELD.to_owned(), self.event.clone());
        if let Some(metadata) = &self.system_metadata {
            let value = serde_json::to_value(metadata).map_err(|e| {
                TimeseriesError::Serialization(format!("system metadata: {e}"))
            })?;
            document.insert(SYSTEM_METADATA_FIELD.to_owned(), value);
        }
        Ok(document)
    }
}
