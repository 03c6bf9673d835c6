//! Startup error types.

use thiserror::Error;
use tsaspect_core::backend::BackendError;

/// Errors raised while loading configuration or wiring the service.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing configuration: {0}")]
    Missing(String),

    /// A configuration value could not be parsed or is out of range.
    #[error("invalid configuration for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The backend client could not be created.
    #[error("backend setup failed: {0}")]
    Backend(#[from] BackendError),
}
