//! Mock `IndexBuilder` implementations for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tsaspect_core::backend::{BackendError, IndexBuilder};

/// An index builder that succeeds and counts how often it was invoked.
#[derive(Debug, Default)]
pub struct RecordingIndexBuilder {
    calls: AtomicUsize,
}

impl RecordingIndexBuilder {
    /// Creates a new recording builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `build_all` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBuilder for RecordingIndexBuilder {
    async fn build_all(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An index builder that always fails.
#[derive(Debug)]
pub struct FailingIndexBuilder;

#[async_trait]
impl IndexBuilder for FailingIndexBuilder {
    async fn build_all(&self) -> Result<(), BackendError> {
        Err(BackendError::Status {
            status: 503,
            body: "cluster_block_exception".into(),
        })
    }
}
