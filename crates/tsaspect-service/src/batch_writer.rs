//! Batched, retrying writer for upsert operations.
//!
//! Producers append to a mutex-protected pending batch and return
//! immediately. A single background task drains the batch when it reaches
//! `max_batch_size` or when `flush_interval` has passed since the last
//! flush, and sends it as one bulk request. Failed requests are retried as a
//! unit with a fixed delay; a batch that fails `max_retries + 1` times is
//! dropped and reported. At most one bulk request is in flight at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use tsaspect_core::backend::{BackendError, IndexBackend, UpsertOperation};
use tsaspect_core::error::TimeseriesError;
use uuid::Uuid;

use crate::config::BatchWriterConfig;
use crate::metrics::ServiceMetrics;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Documents of an abandoned batch that did not reach the index. A bulk
/// response with per-item failures has already applied the other items.
fn documents_lost(err: &BackendError, documents: usize) -> usize {
    match err {
        BackendError::ItemFailures { failed, .. } => (*failed).min(documents),
        _ => documents,
    }
}

#[derive(Default)]
struct Pending {
    operations: Vec<UpsertOperation>,
    // Set under the same lock as pushes, so nothing is accepted after the
    // final drain.
    closed: bool,
}

struct Shared {
    backend: Arc<dyn IndexBackend>,
    config: BatchWriterConfig,
    metrics: Arc<ServiceMetrics>,
    pending: Mutex<Pending>,
    flush_requested: Notify,
    in_flight: tokio::sync::Mutex<()>,
}

impl Shared {
    fn pending_len(&self) -> usize {
        lock(&self.pending).operations.len()
    }

    fn is_shutting_down(&self) -> bool {
        lock(&self.pending).closed
    }

    fn shut_down(&self) {
        lock(&self.pending).closed = true;
        self.flush_requested.notify_one();
    }

    async fn flush_pending(&self) -> Result<usize, TimeseriesError> {
        let _in_flight = self.in_flight.lock().await;
        let batch = std::mem::take(&mut lock(&self.pending).operations);
        if batch.is_empty() {
            return Ok(0);
        }
        self.send_with_retry(&batch).await
    }

    async fn send_with_retry(&self, batch: &[UpsertOperation]) -> Result<usize, TimeseriesError> {
        let batch_id = Uuid::new_v4();
        let documents = batch.len();
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.metrics.flush_attempts.inc();
            match self.backend.bulk_upsert(batch).await {
                Ok(()) => {
                    self.metrics.batches_flushed.inc();
                    self.metrics.documents_flushed.add(as_count(documents));
                    info!(%batch_id, documents, attempt, "flushed timeseries batch");
                    return Ok(documents);
                }
                Err(err) if attempt < max_attempts => {
                    warn!(
                        %batch_id,
                        documents,
                        attempt,
                        error = %err,
                        "bulk flush failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_interval).await;
                }
                Err(err) => {
                    let lost = documents_lost(&err, documents);
                    self.metrics.batches_abandoned.inc();
                    self.metrics.documents_abandoned.add(as_count(lost));
                    error!(
                        %batch_id,
                        documents,
                        lost,
                        attempts = attempt,
                        error = %err,
                        "abandoning timeseries batch after exhausting retries"
                    );
                    return Err(TimeseriesError::BackendWrite {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

async fn run(shared: Arc<Shared>) {
    let mut deadline = Instant::now() + shared.config.flush_interval;
    loop {
        tokio::select! {
            () = shared.flush_requested.notified() => {
                // A permit left over from a batch that was already drained
                // by an explicit flush.
                if !shared.is_shutting_down()
                    && shared.pending_len() < shared.config.max_batch_size
                {
                    continue;
                }
            }
            () = tokio::time::sleep_until(deadline) => {}
        }

        // Failures are logged and counted inside; the writer keeps going.
        let _ = shared.flush_pending().await;
        deadline = Instant::now() + shared.config.flush_interval;

        if shared.is_shutting_down() {
            debug!("batch writer stopped");
            break;
        }
    }
}

/// Handle to a running batch writer.
pub struct BatchWriter {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("config", &self.shared.config)
            .field("pending", &self.shared.pending_len())
            .finish_non_exhaustive()
    }
}

impl BatchWriter {
    /// Starts the background flush task. Must be called from within a tokio
    /// runtime.
    #[must_use]
    pub fn start(
        backend: Arc<dyn IndexBackend>,
        config: BatchWriterConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let shared = Arc::new(Shared {
            backend,
            config,
            metrics,
            pending: Mutex::new(Pending::default()),
            flush_requested: Notify::new(),
            in_flight: tokio::sync::Mutex::new(()),
        });
        let worker = tokio::spawn(run(Arc::clone(&shared)));
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Appends an operation to the pending batch without waiting for it to
    /// be written. Returns `false` if the writer is shutting down and the
    /// operation was not accepted.
    pub fn enqueue(&self, operation: UpsertOperation) -> bool {
        let pending = {
            let mut pending = lock(&self.shared.pending);
            if pending.closed {
                drop(pending);
                warn!(
                    index = %operation.index,
                    id = %operation.id,
                    "batch writer is closed, dropping document"
                );
                return false;
            }
            pending.operations.push(operation);
            pending.operations.len()
        };
        self.shared.metrics.documents_enqueued.inc();
        if pending >= self.shared.config.max_batch_size {
            self.shared.flush_requested.notify_one();
        }
        true
    }

    /// Number of operations waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.pending_len()
    }

    /// Flushes the pending batch now and waits for the result. Waits for any
    /// flush already in flight first.
    ///
    /// # Errors
    ///
    /// Returns `TimeseriesError::BackendWrite` if the batch was abandoned
    /// after exhausting retries.
    pub async fn flush(&self) -> Result<usize, TimeseriesError> {
        self.shared.flush_pending().await
    }

    /// Stops the background task after a final flush of everything pending.
    /// Operations enqueued afterwards are rejected.
    pub async fn close(&self) {
        self.shared.shut_down();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "batch writer task failed");
            }
        }
        // Anything accepted while the worker was finishing.
        let _ = self.shared.flush_pending().await;
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        self.shared.shut_down();
    }
}
