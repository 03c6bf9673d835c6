//! Time-series aspect indexing service.
//!
//! Accepts point-in-time aspect documents, writes them to per-aspect indices
//! through a batched, retrying bulk writer, and answers time-range queries
//! over them.

pub mod batch_writer;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod telemetry;

pub use batch_writer::BatchWriter;
pub use bootstrap::build_elasticsearch_service;
pub use config::{BatchWriterConfig, TimeseriesServiceConfig};
pub use error::ConfigError;
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use service::TimeseriesAspectService;
