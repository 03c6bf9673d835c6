//! Shared helpers for service integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tsaspect_core::backend::IndexBackend;
use tsaspect_core::envelope::EnvelopedAspect;
use tsaspect_core::event::TimeseriesEvent;
use tsaspect_core::index::{IndexConvention, IndexName};
use tsaspect_service::{BatchWriterConfig, TimeseriesAspectService};
use tsaspect_test_support::RecordingIndexBuilder;

/// Batch settings that never flush on their own within a test.
pub fn manual_flush_config() -> BatchWriterConfig {
    BatchWriterConfig {
        max_batch_size: 1000,
        flush_interval: Duration::from_secs(3600),
        max_retries: 2,
        retry_interval: Duration::from_millis(100),
    }
}

/// Builds an unconfigured service over `backend` with no index prefix.
pub fn build_service(
    backend: Arc<dyn IndexBackend>,
    config: BatchWriterConfig,
) -> TimeseriesAspectService {
    TimeseriesAspectService::new(
        backend,
        Arc::new(RecordingIndexBuilder::new()),
        IndexConvention::new(),
        config,
    )
    .unwrap()
}

/// Builds and configures a service over `backend`.
pub async fn configured_service(
    backend: Arc<dyn IndexBackend>,
    config: BatchWriterConfig,
) -> TimeseriesAspectService {
    let service = build_service(backend, config);
    service.configure().await.unwrap();
    service
}

/// Index used by the dataset profile tests.
pub fn profile_index() -> IndexName {
    IndexConvention::new().timeseries_index_name("dataset", "datasetProfile")
}

/// Ingests a `dataset`/`datasetProfile` event.
pub fn ingest_profile(service: &TimeseriesAspectService, urn: &str, ts: i64, payload: Value) {
    service
        .ingest_event(
            "dataset",
            "datasetProfile",
            &TimeseriesEvent::new(urn, ts, payload),
        )
        .unwrap();
}

/// Queries `dataset`/`datasetProfile` events of `urn`.
pub async fn query_profile(
    service: &TimeseriesAspectService,
    urn: &str,
    start: Option<i64>,
    end: Option<i64>,
    limit: u32,
) -> Result<Vec<EnvelopedAspect>, tsaspect_core::error::TimeseriesError> {
    service
        .get_aspect_values(urn, "dataset", "datasetProfile", start, end, limit)
        .await
}

/// Decoded payloads of `results`, in order.
pub fn payloads(results: &[EnvelopedAspect]) -> Vec<Value> {
    results.iter().map(|r| r.aspect.to_json().unwrap()).collect()
}
