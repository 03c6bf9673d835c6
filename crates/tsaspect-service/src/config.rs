//! Service configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tsaspect_core::index::{AspectKey, IndexConvention};

use crate::error::ConfigError;

/// Tuning for the batch writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriterConfig {
    /// Pending operations that force a flush.
    pub max_batch_size: usize,
    /// Longest time pending operations wait before a flush.
    pub flush_interval: Duration,
    /// Retries per batch after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_interval: Duration,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            flush_interval: Duration::from_secs(1),
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl BatchWriterConfig {
    /// Checks that the writer can make progress with these settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero batch size or a zero flush
    /// interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: BULK_REQUESTS_LIMIT.into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: BULK_FLUSH_PERIOD.into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

const ELASTICSEARCH_URL: &str = "ELASTICSEARCH_URL";
const REQUEST_TIMEOUT: &str = "ELASTICSEARCH_REQUEST_TIMEOUT_SECS";
const INDEX_PREFIX: &str = "INDEX_PREFIX";
const ASPECTS: &str = "TIMESERIES_ASPECTS";
const BULK_REQUESTS_LIMIT: &str = "TIMESERIES_BULK_REQUESTS_LIMIT";
const BULK_FLUSH_PERIOD: &str = "TIMESERIES_BULK_FLUSH_PERIOD_SECS";
const BULK_NUM_RETRIES: &str = "TIMESERIES_BULK_NUM_RETRIES";
const BULK_RETRY_INTERVAL: &str = "TIMESERIES_BULK_RETRY_INTERVAL_SECS";

/// Full service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesServiceConfig {
    /// Base URL of the Elasticsearch cluster.
    pub elasticsearch_url: String,
    /// Timeout applied to every backend request.
    pub request_timeout: Duration,
    /// Optional index name prefix.
    pub index_prefix: Option<String>,
    /// Aspects whose indices `configure` creates.
    pub aspects: Vec<AspectKey>,
    /// Batch writer tuning.
    pub batch: BatchWriterConfig,
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_owned(),
            reason: e.to_string(),
        }),
    }
}

impl TimeseriesServiceConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is
    /// invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let elasticsearch_url = lookup(ELASTICSEARCH_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing(ELASTICSEARCH_URL.into()))?;

        let aspects = match lookup(ASPECTS) {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .filter(|entry| !entry.trim().is_empty())
                .map(|entry| {
                    entry.parse::<AspectKey>().map_err(|reason| ConfigError::Invalid {
                        key: ASPECTS.into(),
                        reason,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let defaults = BatchWriterConfig::default();
        let batch = BatchWriterConfig {
            max_batch_size: parse_var(&lookup, BULK_REQUESTS_LIMIT, defaults.max_batch_size)?,
            flush_interval: Duration::from_secs(parse_var(
                &lookup,
                BULK_FLUSH_PERIOD,
                defaults.flush_interval.as_secs(),
            )?),
            max_retries: parse_var(&lookup, BULK_NUM_RETRIES, defaults.max_retries)?,
            retry_interval: Duration::from_secs(parse_var(
                &lookup,
                BULK_RETRY_INTERVAL,
                defaults.retry_interval.as_secs(),
            )?),
        };
        batch.validate()?;

        Ok(Self {
            elasticsearch_url,
            request_timeout: Duration::from_secs(parse_var(&lookup, REQUEST_TIMEOUT, 30)?),
            index_prefix: lookup(INDEX_PREFIX).filter(|p| !p.is_empty()),
            aspects,
            batch,
        })
    }

    /// The index naming convention implied by `index_prefix`.
    #[must_use]
    pub fn index_convention(&self) -> IndexConvention {
        match &self.index_prefix {
            Some(prefix) => IndexConvention::with_prefix(prefix.clone()),
            None => IndexConvention::new(),
        }
    }
}
