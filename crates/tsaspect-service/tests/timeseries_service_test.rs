//! Integration tests for the time-series aspect service.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tsaspect_core::error::TimeseriesError;
use tsaspect_core::event::{SystemMetadata, TimeseriesEvent};
use tsaspect_core::index::IndexConvention;
use tsaspect_service::{BatchWriterConfig, ConfigError, TimeseriesAspectService};
use tsaspect_test_support::{
    FailingIndexBackend, FailingIndexBuilder, FlakyIndexBackend, InMemoryIndexBackend,
    RecordingIndexBuilder, wait_for,
};

use common::{ingest_profile, payloads, query_profile};

#[tokio::test]
async fn test_events_are_returned_newest_first() {
    // Arrange
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend.clone(), common::manual_flush_config()).await;
    ingest_profile(&service, "ds1", 100, json!({"rows": 10}));
    ingest_profile(&service, "ds1", 200, json!({"rows": 20}));
    service.flush().await.unwrap();

    // Act
    let results = query_profile(&service, "ds1", Some(0), Some(1000), 5)
        .await
        .unwrap();

    // Assert
    assert_eq!(
        payloads(&results),
        vec![json!({"rows": 20}), json!({"rows": 10})]
    );
    assert!(
        results
            .iter()
            .all(|r| r.aspect.content_type == "application/json")
    );
}

#[tokio::test]
async fn test_window_bounds_are_inclusive_and_limit_applies() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend, common::manual_flush_config()).await;
    for ts in [50, 100, 150, 200, 250] {
        ingest_profile(&service, "e1", ts, json!({"ts": ts}));
    }
    ingest_profile(&service, "e2", 150, json!({"ts": 150}));
    service.flush().await.unwrap();

    let all_in_window = query_profile(&service, "e1", Some(100), Some(200), 10)
        .await
        .unwrap();
    let limited = query_profile(&service, "e1", Some(100), Some(200), 2)
        .await
        .unwrap();

    assert_eq!(
        payloads(&all_in_window),
        vec![json!({"ts": 200}), json!({"ts": 150}), json!({"ts": 100})]
    );
    assert_eq!(
        payloads(&limited),
        vec![json!({"ts": 200}), json!({"ts": 150})]
    );
}

#[tokio::test]
async fn test_open_bounds_return_everything_for_entity() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend, common::manual_flush_config()).await;
    for ts in [1, 2, 3] {
        ingest_profile(&service, "ds1", ts, json!({}));
    }
    service.flush().await.unwrap();

    let results = query_profile(&service, "ds1", None, None, 10)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_duplicate_upserts_store_one_document() {
    // Arrange
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend.clone(), common::manual_flush_config()).await;
    let document = json!({"urn": "ds1", "timestampMillis": 100, "event": {"rows": 10}});
    let mut reordered = serde_json::Map::new();
    reordered.insert("event".to_owned(), json!({"rows": 10}));
    reordered.insert("timestampMillis".to_owned(), json!(100));
    reordered.insert("urn".to_owned(), json!("ds1"));

    // Act
    service
        .upsert_document("dataset", "datasetProfile", &document)
        .unwrap();
    service
        .upsert_document("dataset", "datasetProfile", &reordered)
        .unwrap();
    service.flush().await.unwrap();
    service
        .upsert_document("dataset", "datasetProfile", &reordered)
        .unwrap();
    service.flush().await.unwrap();

    // Assert
    let documents = backend.documents(&common::profile_index());
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].0.len(), 64);
}

#[tokio::test]
async fn test_calls_before_configure_are_rejected() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::build_service(backend.clone(), common::manual_flush_config());

    let upsert = service.upsert_document("dataset", "datasetProfile", &json!({"urn": "ds1"}));
    let query = query_profile(&service, "ds1", None, None, 10).await;
    let flush = service.flush().await;

    assert!(matches!(upsert, Err(TimeseriesError::NotConfigured)));
    assert!(matches!(query, Err(TimeseriesError::NotConfigured)));
    assert!(matches!(flush, Err(TimeseriesError::NotConfigured)));
    assert!(backend.searches().is_empty());
    assert!(!service.is_configured());
}

#[tokio::test]
async fn test_zero_flush_interval_is_rejected_at_construction() {
    let config = BatchWriterConfig {
        flush_interval: Duration::ZERO,
        ..common::manual_flush_config()
    };

    let result = TimeseriesAspectService::new(
        Arc::new(InMemoryIndexBackend::new()),
        Arc::new(RecordingIndexBuilder::new()),
        IndexConvention::new(),
        config,
    );

    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[tokio::test]
async fn test_configure_builds_indices_once() {
    let builder = Arc::new(RecordingIndexBuilder::new());
    let service = TimeseriesAspectService::new(
        Arc::new(InMemoryIndexBackend::new()),
        builder.clone(),
        IndexConvention::new(),
        common::manual_flush_config(),
    )
    .unwrap();

    service.configure().await.unwrap();
    service.configure().await.unwrap();

    assert_eq!(builder.calls(), 1);
    assert!(service.is_configured());
}

#[tokio::test]
async fn test_failed_index_setup_leaves_service_unconfigured() {
    let service = TimeseriesAspectService::new(
        Arc::new(InMemoryIndexBackend::new()),
        Arc::new(FailingIndexBuilder),
        IndexConvention::new(),
        common::manual_flush_config(),
    )
    .unwrap();

    let result = service.configure().await;

    assert!(matches!(result, Err(TimeseriesError::IndexSetup(_))));
    assert!(!service.is_configured());
    assert!(matches!(
        service.upsert_document("dataset", "datasetProfile", &json!({})),
        Err(TimeseriesError::NotConfigured)
    ));
}

#[tokio::test]
async fn test_query_failure_is_distinct_from_empty_result() {
    // Arrange
    let failing = common::configured_service(
        Arc::new(FailingIndexBackend::new()),
        common::manual_flush_config(),
    )
    .await;
    let empty = common::configured_service(
        Arc::new(InMemoryIndexBackend::new()),
        common::manual_flush_config(),
    )
    .await;

    // Act
    let failed = query_profile(&failing, "ds1", None, None, 10).await;
    let nothing = query_profile(&empty, "ds1", None, None, 10).await;

    // Assert
    assert!(matches!(failed, Err(TimeseriesError::QueryExecution(_))));
    assert!(nothing.unwrap().is_empty());
    assert_eq!(failing.metrics().search_failures.get(), 1);
    assert_eq!(failing.metrics().search_latency.count(), 1);
    assert_eq!(empty.metrics().search_failures.get(), 0);
}

#[tokio::test]
async fn test_corrupt_stored_document_is_a_decode_error() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend.clone(), common::manual_flush_config()).await;
    backend.insert_raw(
        &common::profile_index(),
        "corrupt",
        json!({"urn": "ds1", "timestampMillis": 5}),
    );

    let result = query_profile(&service, "ds1", None, None, 10).await;

    assert!(matches!(result, Err(TimeseriesError::Decode(_))));
}

#[tokio::test]
async fn test_unserializable_document_is_dropped_without_affecting_batch() {
    // Arrange
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend.clone(), common::manual_flush_config()).await;
    let mut unserializable = HashMap::new();
    unserializable.insert(vec![1u8, 2], "value");
    let first = json!({"urn": "ds1", "timestampMillis": 1, "event": {}});
    let second = json!({"urn": "ds1", "timestampMillis": 2, "event": {}});

    // Act
    service
        .upsert_document("dataset", "datasetProfile", &first)
        .unwrap();
    let dropped = service.upsert_document("dataset", "datasetProfile", &unserializable);
    service
        .upsert_document("dataset", "datasetProfile", &second)
        .unwrap();
    let flushed = service.flush().await.unwrap();

    // Assert
    assert!(dropped.is_ok());
    assert_eq!(flushed, 2);
    assert_eq!(backend.document_count(), 2);
    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.documents_rejected, 1);
    assert_eq!(snapshot.documents_enqueued, 2);
}

#[tokio::test]
async fn test_projected_fields_are_stored_at_top_level() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend.clone(), common::manual_flush_config()).await;

    ingest_profile(
        &service,
        "ds1",
        100,
        json!({"rowCount": 10, "columnCount": 3, "other": true}),
    );
    service.flush().await.unwrap();

    let documents = backend.documents(&common::profile_index());
    assert_eq!(documents.len(), 1);
    let stored = &documents[0].1;
    assert_eq!(stored["rowCount"], json!(10));
    assert_eq!(stored["columnCount"], json!(3));
    assert!(stored.get("other").is_none());
    assert_eq!(stored["event"]["other"], json!(true));
}

#[tokio::test]
async fn test_system_metadata_is_returned_with_event() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend, common::manual_flush_config()).await;
    let metadata = SystemMetadata {
        run_id: Some("ingest-42".to_owned()),
        last_observed: Some(99),
        ..SystemMetadata::default()
    };
    let event = TimeseriesEvent::new("ds1", 100, json!({"rows": 1}))
        .with_system_metadata(metadata.clone());

    service
        .ingest_event("dataset", "datasetProfile", &event)
        .unwrap();
    service.flush().await.unwrap();
    let results = query_profile(&service, "ds1", None, None, 1)
        .await
        .unwrap();

    assert_eq!(results[0].system_metadata, Some(metadata));
}

#[tokio::test]
async fn test_prefix_is_applied_to_written_index() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let convention = IndexConvention::with_prefix("prod");
    let service = TimeseriesAspectService::new(
        backend.clone(),
        Arc::new(RecordingIndexBuilder::new()),
        convention.clone(),
        common::manual_flush_config(),
    )
    .unwrap();
    service.configure().await.unwrap();

    let event = TimeseriesEvent::new("c1", 1, json!({}));
    service
        .ingest_event("chart", "chartUsageStatistics", &event)
        .unwrap();
    service.flush().await.unwrap();

    let index = convention.timeseries_index_name("chart", "chartUsageStatistics");
    assert_eq!(index.as_str(), "prod_chart_chartusagestatisticsaspect_v1");
    assert_eq!(backend.documents(&index).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_batch_does_not_stop_the_service() {
    // Arrange
    let backend = Arc::new(FlakyIndexBackend::new(3));
    let service = common::configured_service(backend.clone(), common::manual_flush_config()).await;
    ingest_profile(&service, "ds1", 1, json!({"lost": true}));

    // Act
    let abandoned = service.flush().await;
    ingest_profile(&service, "ds1", 2, json!({"kept": true}));
    let recovered = service.flush().await;

    // Assert
    assert!(matches!(
        abandoned,
        Err(TimeseriesError::BackendWrite { attempts: 3, .. })
    ));
    assert_eq!(recovered.unwrap(), 1);
    let results = query_profile(&service, "ds1", None, None, 10)
        .await
        .unwrap();
    assert_eq!(payloads(&results), vec![json!({"kept": true})]);
    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.batches_abandoned, 1);
    assert_eq!(snapshot.documents_abandoned, 1);
    assert_eq!(snapshot.batches_flushed, 1);
    assert_eq!(snapshot.flush_attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn test_documents_become_visible_after_flush_interval() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let config = BatchWriterConfig {
        max_batch_size: 100,
        flush_interval: Duration::from_secs(1),
        ..common::manual_flush_config()
    };
    let service = common::configured_service(backend.clone(), config).await;

    ingest_profile(&service, "ds1", 1, json!({}));

    assert_eq!(backend.document_count(), 0);
    assert!(wait_for(|| backend.document_count() == 1, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_close_writes_pending_documents() {
    let backend = Arc::new(InMemoryIndexBackend::new());
    let service = common::configured_service(backend.clone(), common::manual_flush_config()).await;
    ingest_profile(&service, "ds1", 1, json!({}));

    service.close().await;

    assert_eq!(backend.document_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_and_readers() {
    // Arrange
    let backend = Arc::new(InMemoryIndexBackend::new());
    let config = BatchWriterConfig {
        max_batch_size: 16,
        flush_interval: Duration::from_millis(20),
        ..common::manual_flush_config()
    };
    let service = Arc::new(common::configured_service(backend.clone(), config).await);

    // Act
    let mut tasks = Vec::new();
    for writer in 0..8_i64 {
        let service = Arc::clone(&service);
        tasks.push(tokio::spawn(async move {
            let urn = format!("ds{writer}");
            for i in 0..50_i64 {
                ingest_profile(&service, &urn, i, json!({"i": i}));
                if i % 10 == 0 {
                    query_profile(&service, &urn, None, None, 5).await.unwrap();
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    service.close().await;

    // Assert
    assert_eq!(backend.document_count(), 400);
    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.documents_enqueued, 400);
    assert_eq!(snapshot.documents_flushed, 400);
    assert_eq!(snapshot.batches_abandoned, 0);
}
