//! The time-series aspect service.
//!
//! Writers call `upsert_document` (or `ingest_event`) from any number of
//! tasks; documents are hashed to a content-derived ID and handed to the
//! batch writer. Readers call `get_aspect_values`, which runs one range
//! query and decodes the hits. Nothing but `configure` is accepted until
//! `configure` has completed once.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};
use tsaspect_core::backend::{IndexBackend, IndexBuilder, UpsertOperation};
use tsaspect_core::document::canonicalize;
use tsaspect_core::envelope::{EnvelopedAspect, decode_hits};
use tsaspect_core::error::TimeseriesError;
use tsaspect_core::event::TimeseriesEvent;
use tsaspect_core::index::{IndexConvention, IndexName};
use tsaspect_core::projection::ProjectionRegistry;
use tsaspect_core::query::{QueryWindow, build_range_query};

use crate::batch_writer::BatchWriter;
use crate::config::BatchWriterConfig;
use crate::error::ConfigError;
use crate::metrics::ServiceMetrics;

/// Write and query façade over the time-series indices.
pub struct TimeseriesAspectService {
    backend: Arc<dyn IndexBackend>,
    index_builder: Arc<dyn IndexBuilder>,
    convention: IndexConvention,
    projections: ProjectionRegistry,
    batch_config: BatchWriterConfig,
    metrics: Arc<ServiceMetrics>,
    writer: OnceCell<BatchWriter>,
}

impl std::fmt::Debug for TimeseriesAspectService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeseriesAspectService")
            .field("convention", &self.convention)
            .field("batch_config", &self.batch_config)
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

impl TimeseriesAspectService {
    /// Creates an unconfigured service with the default projections.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `batch_config` would stop the batch
    /// writer from making progress.
    pub fn new(
        backend: Arc<dyn IndexBackend>,
        index_builder: Arc<dyn IndexBuilder>,
        convention: IndexConvention,
        batch_config: BatchWriterConfig,
    ) -> Result<Self, ConfigError> {
        batch_config.validate()?;
        Ok(Self {
            backend,
            index_builder,
            convention,
            projections: ProjectionRegistry::with_defaults(),
            batch_config,
            metrics: Arc::new(ServiceMetrics::default()),
            writer: OnceCell::new(),
        })
    }

    /// Replaces the projection registry used by `ingest_event`.
    #[must_use]
    pub fn with_projections(mut self, projections: ProjectionRegistry) -> Self {
        self.projections = projections;
        self
    }

    /// Counters and timers for this instance.
    #[must_use]
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Returns `true` once `configure` has completed.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.writer.initialized()
    }

    /// Ensures the required indices exist and starts the batch writer.
    /// Calling it again after success is a no-op; concurrent callers wait
    /// for the same initialization.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::IndexSetup` if the indices could not be
    /// created. The service stays unconfigured and `configure` may be retried.
    #[instrument(skip(self))]
    pub async fn configure(&self) -> Result<(), TimeseriesError> {
        self.writer
            .get_or_try_init(|| async {
                self.index_builder
                    .build_all()
                    .await
                    .map_err(TimeseriesError::IndexSetup)?;
                let flush_interval_ms =
                    u64::try_from(self.batch_config.flush_interval.as_millis()).unwrap_or(u64::MAX);
                info!(
                    max_batch_size = self.batch_config.max_batch_size,
                    flush_interval_ms,
                    max_retries = self.batch_config.max_retries,
                    "timeseries aspect service configured"
                );
                Ok::<_, TimeseriesError>(BatchWriter::start(
                    Arc::clone(&self.backend),
                    self.batch_config.clone(),
                    Arc::clone(&self.metrics),
                ))
            })
            .await?;
        Ok(())
    }

    fn writer(&self, operation: &str) -> Result<&BatchWriter, TimeseriesError> {
        self.writer.get().ok_or_else(|| {
            warn!(operation, "rejecting call before configure");
            TimeseriesError::NotConfigured
        })
    }

    /// Queues `document` for an idempotent upsert into the index for
    /// `(entity_type, aspect_type)` and returns without waiting for the
    /// write. A document that cannot be serialized is logged, counted and
    /// dropped; it never affects other queued documents.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::NotConfigured` before `configure`.
    pub fn upsert_document<T>(
        &self,
        entity_type: &str,
        aspect_type: &str,
        document: &T,
    ) -> Result<(), TimeseriesError>
    where
        T: Serialize + ?Sized,
    {
        let writer = self.writer("upsert_document")?;
        let index = self.convention.timeseries_index_name(entity_type, aspect_type);

        let canonical = match canonicalize(document) {
            Ok(canonical) => canonical,
            Err(e) => {
                self.reject(&index, &e);
                return Ok(());
            }
        };

        debug!(index = %index, id = %canonical.id, "queueing upsert");
        writer.enqueue(UpsertOperation {
            index,
            id: canonical.id,
            body: canonical.body,
        });
        Ok(())
    }

    /// Renders `event` with the projections registered for `aspect_type`
    /// and queues it like `upsert_document`.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::NotConfigured` before `configure`.
    pub fn ingest_event(
        &self,
        entity_type: &str,
        aspect_type: &str,
        event: &TimeseriesEvent,
    ) -> Result<(), TimeseriesError> {
        self.writer("ingest_event")?;
        match event.to_projected_document(aspect_type, &self.projections) {
            Ok(document) => self.upsert_document(entity_type, aspect_type, &document),
            Err(e) => {
                let index = self.convention.timeseries_index_name(entity_type, aspect_type);
                self.reject(&index, &e);
                Ok(())
            }
        }
    }

    fn reject(&self, index: &IndexName, err: &TimeseriesError) {
        self.metrics.documents_rejected.inc();
        error!(
            index = %index,
            error = %err,
            "dropping document that could not be serialized"
        );
    }

    /// Returns up to `limit` events of `entity_urn` with a timestamp inside
    /// the inclusive `[start_millis, end_millis]` window, newest first. An
    /// absent bound leaves that side open.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::NotConfigured` before `configure`,
    /// `TimeseriesError::QueryExecution` if the backend call fails, and
    /// `TimeseriesError::Decode` if any hit cannot be decoded.
    #[instrument(skip(self))]
    pub async fn get_aspect_values(
        &self,
        entity_urn: &str,
        entity_type: &str,
        aspect_type: &str,
        start_millis: Option<i64>,
        end_millis: Option<i64>,
        limit: u32,
    ) -> Result<Vec<EnvelopedAspect>, TimeseriesError> {
        self.writer("get_aspect_values")?;
        let index = self.convention.timeseries_index_name(entity_type, aspect_type);
        let query = build_range_query(&QueryWindow {
            entity_urn: entity_urn.to_owned(),
            start_millis,
            end_millis,
            limit,
        });
        debug!(index = %index, ?query, "executing range query");

        self.metrics.searches.inc();
        let started = Instant::now();
        let result = self.backend.search(&index, &query).await;
        self.metrics.search_latency.record(started.elapsed());

        let hits = result.map_err(|e| {
            self.metrics.search_failures.inc();
            error!(index = %index, error = %e, "range query failed");
            TimeseriesError::QueryExecution(e)
        })?;

        decode_hits(&hits)
    }

    /// Flushes everything queued so far and waits for the bulk request.
    /// Returns the number of documents written.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::NotConfigured` before `configure` and
    /// `TimeseriesError::BackendWrite` if the batch was abandoned.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<usize, TimeseriesError> {
        self.writer("flush")?.flush().await
    }

    /// Writes out pending documents and stops the background flusher. Later
    /// upserts are dropped.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        if let Some(writer) = self.writer.get() {
            writer.close().await;
        }
    }
}
