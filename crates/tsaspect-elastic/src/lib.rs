//! Elasticsearch backend for the time-series aspect index.
//!
//! Implements `IndexBackend` over the `_bulk` and `_search` REST endpoints
//! and `IndexBuilder` over index existence checks and creation.

pub mod client;
pub mod dsl;
pub mod index_builder;
pub mod schema;

pub use client::ElasticsearchBackend;
pub use index_builder::ElasticIndexBuilder;
