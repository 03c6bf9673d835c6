//! Index backend abstraction.

use async_trait::async_trait;
use thiserror::Error;

use crate::document::DocumentId;
use crate::index::IndexName;
use crate::query::SearchQuery;

/// Errors returned by an index backend implementation.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Connection, timeout or other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status {
        /// HTTP-like status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The backend response could not be parsed.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// Some operations inside a bulk request were rejected.
    #[error("{failed} bulk operations failed: {reason}")]
    ItemFailures {
        /// Number of rejected operations.
        failed: usize,
        /// Reason reported for the first rejected operation.
        reason: String,
    },
}

/// A single "update, or insert if absent" operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOperation {
    /// Target index.
    pub index: IndexName,
    /// Content-derived document identifier.
    pub id: DocumentId,
    /// Canonical JSON body of the document.
    pub body: String,
}

/// One hit returned by a search, in backend order.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Document identifier.
    pub id: String,
    /// Stored document body.
    pub source: serde_json::Value,
}

/// Write and read access to the index backend.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Sends all operations as one bulk request. The whole request either
    /// succeeds or is reported as failed.
    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> Result<(), BackendError>;

    /// Executes a search against a single index, returning hits in backend
    /// order.
    async fn search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, BackendError>;
}

/// Creates the indices the service writes to, if they are missing.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    /// Ensures every required index exists.
    async fn build_all(&self) -> Result<(), BackendError>;
}
