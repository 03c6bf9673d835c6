//! Service counters and timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Adds one.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Adds `n`.
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Records call durations.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_micros: AtomicU64,
    last_micros: AtomicU64,
}

impl Timer {
    /// Records one observation.
    pub fn record(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.last_micros.store(micros, Ordering::Relaxed);
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all observations.
    pub fn total(&self) -> Duration {
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed))
    }

    /// Most recent observation.
    pub fn last(&self) -> Duration {
        Duration::from_micros(self.last_micros.load(Ordering::Relaxed))
    }
}

/// Everything the service reports about its own behaviour.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Documents accepted into the pending batch.
    pub documents_enqueued: Counter,
    /// Documents dropped because they could not be serialized.
    pub documents_rejected: Counter,
    /// Bulk requests sent, including retries.
    pub flush_attempts: Counter,
    /// Batches written successfully.
    pub batches_flushed: Counter,
    /// Documents written successfully.
    pub documents_flushed: Counter,
    /// Batches abandoned after exhausting retries.
    pub batches_abandoned: Counter,
    /// Documents lost with abandoned batches.
    pub documents_abandoned: Counter,
    /// Searches executed.
    pub searches: Counter,
    /// Searches that failed at the backend.
    pub search_failures: Counter,
    /// Search latency.
    pub search_latency: Timer,
}

/// Point-in-time copy of `ServiceMetrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_field_names)]
pub struct MetricsSnapshot {
    /// See `ServiceMetrics::documents_enqueued`.
    pub documents_enqueued: u64,
    /// See `ServiceMetrics::documents_rejected`.
    pub documents_rejected: u64,
    /// See `ServiceMetrics::flush_attempts`.
    pub flush_attempts: u64,
    /// See `ServiceMetrics::batches_flushed`.
    pub batches_flushed: u64,
    /// See `ServiceMetrics::documents_flushed`.
    pub documents_flushed: u64,
    /// See `ServiceMetrics::batches_abandoned`.
    pub batches_abandoned: u64,
    /// See `ServiceMetrics::documents_abandoned`.
    pub documents_abandoned: u64,
    /// See `ServiceMetrics::searches`.
    pub searches: u64,
    /// See `ServiceMetrics::search_failures`.
    pub search_failures: u64,
}

impl ServiceMetrics {
    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_enqueued: self.documents_enqueued.get(),
            documents_rejected: self.documents_rejected.get(),
            flush_attempts: self.flush_attempts.get(),
            batches_flushed: self.batches_flushed.get(),
            documents_flushed: self.documents_flushed.get(),
            batches_abandoned: self.batches_abandoned.get(),
            documents_abandoned: self.documents_abandoned.get(),
            searches: self.searches.get(),
            search_failures: self.search_failures.get(),
        }
    }
}
