//! Range query construction.
//!
//! Queries are plain values: building one does no I/O, and each backend
//! translates it into its own query language.

use serde::{Deserialize, Serialize};

use crate::event::{TIMESTAMP_FIELD, URN_FIELD};

/// The time window requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    /// Entity whose events are requested.
    pub entity_urn: String,
    /// Inclusive lower bound, in epoch millis.
    pub start_millis: Option<i64>,
    /// Inclusive upper bound, in epoch millis.
    pub end_millis: Option<i64>,
    /// Maximum number of results.
    pub limit: u32,
}

/// Comparison used by a range clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeOp {
    /// Greater than or equal to.
    Gte,
    /// Less than or equal to.
    Lte,
}

/// A single filter clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clause {
    /// Exact match of a keyword field.
    Term {
        /// Field name.
        field: String,
        /// Expected value.
        value: String,
    },
    /// Numeric comparison of a field against a bound.
    Range {
        /// Field name.
        field: String,
        /// Comparison.
        op: RangeOp,
        /// Bound.
        value: i64,
    },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort by.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
}

/// A conjunctive filter with a sort and a result size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Clauses that must all match.
    pub must: Vec<Clause>,
    /// Result ordering.
    pub sort: SortSpec,
    /// Maximum number of hits.
    pub size: u32,
}

/// Builds the query for a window: an exact entity match, optional inclusive
/// timestamp bounds, newest first, at most `limit` hits.
#[must_use]
pub fn build_range_query(window: &QueryWindow) -> SearchQuery {
    let mut must = vec![Clause::Term {
        field: URN_FIELD.to_owned(),
        value: window.entity_urn.clone(),
    }];
    if let Some(start) = window.start_millis {
        must.push(Clause::Range {
            field: TIMESTAMP_FIELD.to_owned(),
            op: RangeOp::Gte,
            value: start,
        });
    }
    if let Some(end) = window.end_millis {
        must.push(Clause::Range {
            field: TIMESTAMP_FIELD.to_owned(),
            op: RangeOp::Lte,
            value: end,
        });
    }
    SearchQuery {
        must,
        sort: SortSpec {
            field: TIMESTAMP_FIELD.to_owned(),
            order: SortOrder::Descending,
        },
        size: window.limit,
    }
}
