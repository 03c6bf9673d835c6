//! Aspect projections.
//!
//! Each aspect type tag maps to a pure function that lifts selected payload
//! fields into flat, top-level document fields so they can be filtered on
//! without reaching into the nested event.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Copies fields from an aspect payload into the flat document.
pub type ProjectionFn = fn(&Value, &mut Map<String, Value>);

/// Registry of projections keyed by aspect type tag.
#[derive(Debug, Clone, Default)]
pub struct ProjectionRegistry {
    projections: HashMap<String, ProjectionFn>,
}

impl ProjectionRegistry {
    /// An empty registry; every aspect type projects nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in dataset and datasource projections.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("datasetProfile", project_dataset_profile);
        registry.register("datasetUsageStatistics", project_dataset_usage);
        registry.register("datasourceKey", project_datasource_key);
        registry.register("datasourceInfo", project_datasource_info);
        registry
    }

    /// Registers (or replaces) the projection for `aspect_type`.
    pub fn register(&mut self, aspect_type: impl Into<String>, projection: ProjectionFn) {
        self.projections.insert(aspect_type.into(), projection);
    }

    /// Returns `true` if a projection exists for `aspect_type`.
    #[must_use]
    pub fn contains(&self, aspect_type: &str) -> bool {
        self.projections.contains_key(aspect_type)
    }

    /// Applies the projection registered for `aspect_type` to `payload`.
    #[must_use]
    pub fn project(&self, aspect_type: &str, payload: &Value) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(projection) = self.projections.get(aspect_type) {
            projection(payload, &mut fields);
        }
        fields
    }
}

fn copy_fields(payload: &Value, fields: &mut Map<String, Value>, names: &[&str]) {
    for name in names {
        if let Some(value) = payload.get(*name).filter(|v| !v.is_null()) {
            fields.insert((*name).to_owned(), value.clone());
        }
    }
}

fn project_dataset_profile(payload: &Value, fields: &mut Map<String, Value>) {
    copy_fields(payload, fields, &["rowCount", "columnCount"]);
}

fn project_dataset_usage(payload: &Value, fields: &mut Map<String, Value>) {
    copy_fields(payload, fields, &["uniqueUserCount", "totalSqlQueries"]);
}

fn project_datasource_key(payload: &Value, fields: &mut Map<String, Value>) {
    copy_fields(payload, fields, &["platform", "name"]);
}

fn project_datasource_info(payload: &Value, fields: &mut Map<String, Value>) {
    copy_fields(payload, fields, &["category", "region"]);
}
