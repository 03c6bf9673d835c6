//! Mock `IndexBackend` implementations for tests.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tsaspect_core::backend::{BackendError, IndexBackend, SearchHit, UpsertOperation};
use tsaspect_core::index::IndexName;
use tsaspect_core::query::{Clause, RangeOp, SearchQuery, SortOrder};

/// An in-memory index backend with the same observable semantics as the
/// real one: upserts keyed by document ID, conjunctive term/range filters,
/// sorting and size limits. A search on an index that was never written to
/// returns no hits.
#[derive(Debug, Default)]
pub struct InMemoryIndexBackend {
    indices: Mutex<HashMap<IndexName, BTreeMap<String, Value>>>,
    bulk_batches: Mutex<Vec<Vec<UpsertOperation>>>,
    searches: Mutex<Vec<(IndexName, SearchQuery)>>,
}

impl InMemoryIndexBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `source` under `id` verbatim, bypassing upsert semantics.
    /// Useful for planting malformed documents.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_raw(&self, index: &IndexName, id: &str, source: Value) {
        self.indices
            .lock()
            .unwrap()
            .entry(index.clone())
            .or_default()
            .insert(id.to_owned(), source);
    }

    /// Returns a snapshot of all documents in `index`, ordered by ID.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn documents(&self, index: &IndexName) -> Vec<(String, Value)> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Total number of documents across all indices.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn document_count(&self) -> usize {
        self.indices.lock().unwrap().values().map(BTreeMap::len).sum()
    }

    /// Returns every bulk request received, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn bulk_batches(&self) -> Vec<Vec<UpsertOperation>> {
        self.bulk_batches.lock().unwrap().clone()
    }

    /// Returns every search received, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn searches(&self) -> Vec<(IndexName, SearchQuery)> {
        self.searches.lock().unwrap().clone()
    }
}

fn clause_matches(clause: &Clause, document: &Value) -> bool {
    match clause {
        Clause::Term { field, value } => {
            document.get(field).and_then(Value::as_str) == Some(value.as_str())
        }
        Clause::Range { field, op, value } => {
            match document.get(field).and_then(Value::as_i64) {
                Some(actual) => match op {
                    RangeOp::Gte => actual >= *value,
                    RangeOp::Lte => actual <= *value,
                },
                None => false,
            }
        }
    }
}

fn sort_key(document: &Value, field: &str) -> i64 {
    document.get(field).and_then(Value::as_i64).unwrap_or(i64::MIN)
}

#[async_trait]
impl IndexBackend for InMemoryIndexBackend {
    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> Result<(), BackendError> {
        self.bulk_batches.lock().unwrap().push(operations.to_vec());

        let mut parsed = Vec::with_capacity(operations.len());
        for op in operations {
            let body: Value = serde_json::from_str(&op.body).map_err(|e| {
                BackendError::ItemFailures {
                    failed: 1,
                    reason: format!("document {}: {e}", op.id),
                }
            })?;
            parsed.push((op, body));
        }

        let mut indices = self.indices.lock().unwrap();
        for (op, body) in parsed {
            let docs = indices.entry(op.index.clone()).or_default();
            // Partial update: top-level fields of the new body replace the
            // stored ones.
            if let (Some(Value::Object(existing)), Value::Object(update)) =
                (docs.get_mut(op.id.as_str()), &body)
            {
                existing.extend(update.clone());
                continue;
            }
            docs.insert(op.id.to_string(), body);
        }
        Ok(())
    }

    async fn search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, BackendError> {
        self.searches
            .lock()
            .unwrap()
            .push((index.clone(), query.clone()));

        let indices = self.indices.lock().unwrap();
        let Some(docs) = indices.get(index) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter(|(_, doc)| query.must.iter().all(|clause| clause_matches(clause, doc)))
            .map(|(id, doc)| SearchHit {
                id: id.clone(),
                source: doc.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            let ordering: CmpOrdering =
                sort_key(&a.source, &query.sort.field).cmp(&sort_key(&b.source, &query.sort.field));
            match query.sort.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
        hits.truncate(query.size as usize);
        Ok(hits)
    }
}

/// A backend that always returns a transport error and counts the calls it
/// received. Useful for testing retry and error-propagation paths.
#[derive(Debug, Default)]
pub struct FailingIndexBackend {
    bulk_attempts: AtomicUsize,
    search_attempts: AtomicUsize,
}

impl FailingIndexBackend {
    /// Creates a new failing backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bulk requests received.
    pub fn bulk_attempts(&self) -> usize {
        self.bulk_attempts.load(Ordering::SeqCst)
    }

    /// Number of searches received.
    pub fn search_attempts(&self) -> usize {
        self.search_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBackend for FailingIndexBackend {
    async fn bulk_upsert(&self, _operations: &[UpsertOperation]) -> Result<(), BackendError> {
        self.bulk_attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Transport("connection refused".into()))
    }

    async fn search(
        &self,
        _index: &IndexName,
        _query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, BackendError> {
        self.search_attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Transport("connection refused".into()))
    }
}

/// A backend that rejects the first `failures` bulk requests and then
/// delegates to an `InMemoryIndexBackend`.
#[derive(Debug)]
pub struct FlakyIndexBackend {
    inner: InMemoryIndexBackend,
    remaining_failures: AtomicUsize,
    bulk_attempts: AtomicUsize,
}

impl FlakyIndexBackend {
    /// Creates a backend that fails `failures` times before succeeding.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryIndexBackend::new(),
            remaining_failures: AtomicUsize::new(failures),
            bulk_attempts: AtomicUsize::new(0),
        }
    }

    /// The backend that receives requests once failures run out.
    pub fn inner(&self) -> &InMemoryIndexBackend {
        &self.inner
    }

    /// Number of bulk requests received, failed or not.
    pub fn bulk_attempts(&self) -> usize {
        self.bulk_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBackend for FlakyIndexBackend {
    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> Result<(), BackendError> {
        self.bulk_attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::Status {
                status: 429,
                body: "es_rejected_execution_exception".into(),
            });
        }
        self.inner.bulk_upsert(operations).await
    }

    async fn search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, BackendError> {
        self.inner.search(index, query).await
    }
}

/// A backend whose bulk requests take `delay` to complete. Tracks how many
/// bulk requests were in flight at the same time.
#[derive(Debug)]
pub struct SlowIndexBackend {
    inner: InMemoryIndexBackend,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowIndexBackend {
    /// Creates a backend whose bulk requests each take `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryIndexBackend::new(),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// The backend that stores documents.
    pub fn inner(&self) -> &InMemoryIndexBackend {
        &self.inner
    }

    /// Highest number of concurrent bulk requests observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBackend for SlowIndexBackend {
    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> Result<(), BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.bulk_upsert(operations).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, BackendError> {
        self.inner.search(index, query).await
    }
}

/// A backend whose bulk requests always report `failed` rejected items,
/// the way a bulk response with `"errors": true` does.
#[derive(Debug)]
pub struct RejectingIndexBackend {
    failed: usize,
    bulk_attempts: AtomicUsize,
}

impl RejectingIndexBackend {
    /// Creates a backend that rejects `failed` items of every bulk request.
    #[must_use]
    pub fn new(failed: usize) -> Self {
        Self {
            failed,
            bulk_attempts: AtomicUsize::new(0),
        }
    }

    /// Number of bulk requests received.
    pub fn bulk_attempts(&self) -> usize {
        self.bulk_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBackend for RejectingIndexBackend {
    async fn bulk_upsert(&self, _operations: &[UpsertOperation]) -> Result<(), BackendError> {
        self.bulk_attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::ItemFailures {
            failed: self.failed,
            reason: "mapper_parsing_exception".into(),
        })
    }

    async fn search(
        &self,
        _index: &IndexName,
        _query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, BackendError> {
        Ok(Vec::new())
    }
}
