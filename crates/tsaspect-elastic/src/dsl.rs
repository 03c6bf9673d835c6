//! Request rendering and response parsing for the Elasticsearch REST API.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Value, json};
use tsaspect_core::backend::{BackendError, SearchHit, UpsertOperation};
use tsaspect_core::query::{Clause, RangeOp, SearchQuery, SortOrder};

/// Renders an NDJSON `_bulk` body of update-or-insert actions.
///
/// Each document body is embedded verbatim; it is already canonical JSON.
#[must_use]
pub fn bulk_body(operations: &[UpsertOperation]) -> String {
    let mut body = String::new();
    for op in operations {
        let action = json!({ "update": { "_index": op.index.as_str(), "_id": op.id.as_str() } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(r#"{"doc":"#);
        body.push_str(&op.body);
        body.push_str(r#","doc_as_upsert":true,"detect_noop":false}"#);
        body.push('\n');
    }
    body
}

fn clause_dsl(clause: &Clause) -> Value {
    match clause {
        Clause::Term { field, value } => json!({ "term": { field.as_str(): value } }),
        Clause::Range { field, op, value } => {
            let op = match op {
                RangeOp::Gte => "gte",
                RangeOp::Lte => "lte",
            };
            json!({ "range": { field.as_str(): { op: value } } })
        }
    }
}

/// Renders a `_search` request body.
#[must_use]
pub fn search_body(query: &SearchQuery) -> Value {
    let must: Vec<Value> = query.must.iter().map(clause_dsl).collect();
    let order = match query.sort.order {
        SortOrder::Ascending => "asc",
        SortOrder::Descending => "desc",
    };
    json!({
        "query": { "bool": { "must": must } },
        "sort": [ { query.sort.field.as_str(): { "order": order } } ],
        "size": query.size,
    })
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// The parts of a `_bulk` response this crate looks at.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

/// Turns per-item failures in a bulk response into an error for the whole
/// request.
///
/// # Errors
///
/// Returns `BackendError::ItemFailures` if any item was rejected.
pub fn check_bulk_response(response: &BulkResponse) -> Result<(), BackendError> {
    if !response.errors {
        return Ok(());
    }
    let failures: Vec<&BulkItemResult> = response
        .items
        .iter()
        .flat_map(HashMap::values)
        .filter(|item| item.error.is_some() || item.status >= 300)
        .collect();
    let reason = failures
        .first()
        .and_then(|item| item.error.as_ref())
        .map_or_else(|| "unknown".to_owned(), Value::to_string);
    Err(BackendError::ItemFailures {
        failed: failures.len().max(1),
        reason,
    })
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    hits: RawHits,
}

/// Parses a `_search` response into hits, preserving order.
///
/// # Errors
///
/// Returns `BackendError::MalformedResponse` if the body is not a search
/// response.
pub fn parse_search_response(body: &[u8]) -> Result<Vec<SearchHit>, BackendError> {
    let response: RawSearchResponse = serde_json::from_slice(body)
        .map_err(|e| BackendError::MalformedResponse(format!("search response: {e}")))?;
    Ok(response
        .hits
        .hits
        .into_iter()
        .map(|hit| SearchHit {
            id: hit.id,
            source: hit.source,
        })
        .collect())
}
