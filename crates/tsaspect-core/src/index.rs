//! Index naming convention.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Physical name of a backend index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexName(String);

impl IndexName {
    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An `(entity type, aspect type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AspectKey {
    /// Entity type, e.g. `dataset`.
    pub entity_type: String,
    /// Aspect type, e.g. `datasetProfile`.
    pub aspect_type: String,
}

impl AspectKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, aspect_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            aspect_type: aspect_type.into(),
        }
    }
}

impl FromStr for AspectKey {
    type Err = String;

    /// Parses `entityType:aspectType`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some((entity, aspect)) if !entity.is_empty() && !aspect.is_empty() => {
                Ok(Self::new(entity, aspect))
            }
            _ => Err(format!("expected `entityType:aspectType`, got `{s}`")),
        }
    }
}

/// Maps `(entity type, aspect type)` pairs to index names.
///
/// The mapping is pure: `dataset` + `datasetProfile` always yields
/// `dataset_datasetprofileaspect_v1`, optionally behind a deployment prefix
/// (`prod_dataset_datasetprofileaspect_v1`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexConvention {
    prefix: Option<String>,
}

impl IndexConvention {
    /// Convention without a prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convention that prepends `prefix_` to every index name. An empty
    /// prefix is treated as no prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: (!prefix.is_empty()).then(|| prefix.to_lowercase()),
        }
    }

    /// Returns the index holding all documents of the given entity and
    /// aspect type.
    #[must_use]
    pub fn timeseries_index_name(&self, entity_type: &str, aspect_type: &str) -> IndexName {
        let base = format!("{entity_type}_{aspect_type}aspect_v1").to_lowercase();
        match &self.prefix {
            Some(prefix) => IndexName(format!("{prefix}_{base}")),
            None => IndexName(base),
        }
    }

    /// Same as `timeseries_index_name`, for an `AspectKey`.
    #[must_use]
    pub fn index_for(&self, key: &AspectKey) -> IndexName {
        self.timeseries_index_name(&key.entity_type, &key.aspect_type)
    }
}
