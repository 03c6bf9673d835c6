//! Elasticsearch implementation of the `IndexBackend` trait.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info};
use tsaspect_core::backend::{BackendError, IndexBackend, SearchHit, UpsertOperation};
use tsaspect_core::index::IndexName;
use tsaspect_core::query::SearchQuery;

use crate::dsl::{BulkResponse, bulk_body, check_bulk_response, parse_search_response, search_body};
use crate::schema::TIMESERIES_INDEX_MAPPING;

/// Elasticsearch-backed index backend speaking the REST API.
///
/// Every index is created with the time-series mapping before the first
/// bulk request that writes to it, so no index is left to dynamic mapping.
/// Clones share the set of indices already ensured.
#[derive(Debug, Clone)]
pub struct ElasticsearchBackend {
    http: Client,
    base_url: String,
    ensured: Arc<Mutex<HashSet<IndexName>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn transport(err: &reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Transport(format!("request timed out: {err}"))
    } else {
        BackendError::Transport(err.to_string())
    }
}

async fn status_error(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::Status { status, body }
}

impl ElasticsearchBackend {
    /// Creates a backend for the cluster at `base_url`. Every request is
    /// bounded by `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            ensured: Arc::default(),
        })
    }

    /// Distinct target indices of `operations` not yet ensured by this
    /// backend or one of its clones, in sorted order.
    #[must_use]
    pub fn unensured_indices(&self, operations: &[UpsertOperation]) -> Vec<IndexName> {
        let ensured = lock(&self.ensured);
        let mut missing: Vec<IndexName> = operations
            .iter()
            .map(|op| &op.index)
            .filter(|index| !ensured.contains(*index))
            .cloned()
            .collect();
        drop(ensured);
        missing.sort();
        missing.dedup();
        missing
    }

    fn mark_ensured(&self, index: &IndexName) {
        lock(&self.ensured).insert(index.clone());
    }

    /// Base URL of the cluster, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates `index` with the time-series mapping unless it already
    /// exists. Returns `true` if the index was created by this call.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the existence check or creation fails.
    pub async fn ensure_index(&self, index: &IndexName) -> Result<bool, BackendError> {
        let url = format!("{}/{index}", self.base_url);

        let head = self.http.head(&url).send().await.map_err(|e| transport(&e))?;
        match head.status() {
            StatusCode::NOT_FOUND => {}
            status if status.is_success() => {
                self.mark_ensured(index);
                return Ok(false);
            }
            _ => return Err(status_error(head).await),
        }

        let created = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(TIMESERIES_INDEX_MAPPING)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if created.status().is_success() {
            info!(index = %index, "created timeseries index");
            self.mark_ensured(index);
            return Ok(true);
        }
        match status_error(created).await {
            // Another instance created it between our check and our create.
            BackendError::Status { status: 400, body }
                if body.contains("resource_already_exists_exception") =>
            {
                self.mark_ensured(index);
                Ok(false)
            }
            err => Err(err),
        }
    }
}

#[async_trait]
impl IndexBackend for ElasticsearchBackend {
    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> Result<(), BackendError> {
        if operations.is_empty() {
            return Ok(());
        }
        for index in self.unensured_indices(operations) {
            self.ensure_index(&index).await?;
        }
        let response = self
            .http
            .post(format!("{}/_bulk", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(operations))
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(format!("bulk response: {e}")))?;
        check_bulk_response(&parsed)?;
        debug!(operations = operations.len(), "bulk request accepted");
        Ok(())
    }

    async fn search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let response = self
            .http
            .post(format!("{}/{index}/_search", self.base_url))
            .json(&search_body(query))
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if !response.status().is_success() {
            return match status_error(response).await {
                // No document was ever written for this aspect.
                BackendError::Status { status: 404, body }
                    if body.contains("index_not_found_exception") =>
                {
                    debug!(index = %index, "search on missing index");
                    Ok(Vec::new())
                }
                err => Err(err),
            };
        }
        let body = response.bytes().await.map_err(|e| transport(&e))?;
        parse_search_response(&body)
    }
}
