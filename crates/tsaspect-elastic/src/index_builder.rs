//! Elasticsearch implementation of the `IndexBuilder` trait.

use async_trait::async_trait;
use tracing::info;
use tsaspect_core::backend::{BackendError, IndexBuilder};
use tsaspect_core::index::{AspectKey, IndexConvention, IndexName};

use crate::client::ElasticsearchBackend;

/// Creates one index per registered `(entity type, aspect type)` pair.
#[derive(Debug, Clone)]
pub struct ElasticIndexBuilder {
    backend: ElasticsearchBackend,
    indices: Vec<IndexName>,
}

impl ElasticIndexBuilder {
    /// Creates a builder for the indices of `aspects` under `convention`.
    #[must_use]
    pub fn new(
        backend: ElasticsearchBackend,
        convention: &IndexConvention,
        aspects: &[AspectKey],
    ) -> Self {
        let mut indices: Vec<IndexName> = aspects.iter().map(|k| convention.index_for(k)).collect();
        indices.sort();
        indices.dedup();
        Self { backend, indices }
    }

    /// The indices this builder manages.
    #[must_use]
    pub fn indices(&self) -> &[IndexName] {
        &self.indices
    }
}

#[async_trait]
impl IndexBuilder for ElasticIndexBuilder {
    async fn build_all(&self) -> Result<(), BackendError> {
        let mut created = 0usize;
        for index in &self.indices {
            if self.backend.ensure_index(index).await? {
                created += 1;
            }
        }
        info!(
            indices = self.indices.len(),
            created, "timeseries indices are in place"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_builder_deduplicates_indices() {
        let backend =
            ElasticsearchBackend::new("http://localhost:9200", Duration::from_secs(1)).unwrap();
        let aspects = [
            AspectKey::new("dataset", "datasetProfile"),
            AspectKey::new("dataset", "datasetUsageStatistics"),
            AspectKey::new("dataset", "datasetProfile"),
        ];

        let builder =
            ElasticIndexBuilder::new(backend, &IndexConvention::with_prefix("prod"), &aspects);

        let names: Vec<&str> = builder.indices().iter().map(IndexName::as_str).collect();
        assert_eq!(
            names,
            vec![
                "prod_dataset_datasetprofileaspect_v1",
                "prod_dataset_datasetusagestatisticsaspect_v1",
            ]
        );
    }
}
