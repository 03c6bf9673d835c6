//! Wiring of the service against a real Elasticsearch cluster.

use std::sync::Arc;

use tracing::info;
use tsaspect_elastic::{ElasticIndexBuilder, ElasticsearchBackend};

use crate::config::TimeseriesServiceConfig;
use crate::error::ConfigError;
use crate::service::TimeseriesAspectService;

/// Builds an unconfigured service talking to the cluster in `config`.
/// No request is sent until `configure` is called.
///
/// # Errors
///
/// Returns `ConfigError::Backend` if the HTTP client cannot be created and
/// `ConfigError::Invalid` for unusable batch settings.
pub fn build_elasticsearch_service(
    config: &TimeseriesServiceConfig,
) -> Result<TimeseriesAspectService, ConfigError> {
    let backend = ElasticsearchBackend::new(&config.elasticsearch_url, config.request_timeout)?;
    let convention = config.index_convention();
    let index_builder = ElasticIndexBuilder::new(backend.clone(), &convention, &config.aspects);

    info!(
        url = %backend.base_url(),
        indices = index_builder.indices().len(),
        "wiring timeseries aspect service"
    );

    TimeseriesAspectService::new(
        Arc::new(backend),
        Arc::new(index_builder),
        convention,
        config.batch.clone(),
    )
}
