//! Error types for the time-series aspect index.

use thiserror::Error;

use crate::backend::BackendError;

/// Top-level error type surfaced by the time-series aspect service.
#[derive(Debug, Error)]
pub enum TimeseriesError {
    /// A document could not be turned into its canonical wire form.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A bulk write failed on every attempt and the batch was abandoned.
    #[error("bulk write failed after {attempts} attempts: {source}")]
    BackendWrite {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The error returned by the final attempt.
        #[source]
        source: BackendError,
    },

    /// A search against the backend failed or timed out.
    #[error("query execution failed: {0}")]
    QueryExecution(#[source] BackendError),

    /// A stored document could not be decoded back into an envelope.
    #[error("decode error: {0}")]
    Decode(String),

    /// The service was used before `configure` completed.
    #[error("timeseries aspect service is not configured")]
    NotConfigured,

    /// Required indices could not be created.
    #[error("index setup failed: {0}")]
    IndexSetup(#[source] BackendError),
}
