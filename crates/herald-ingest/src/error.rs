//! Error types for the routing pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while routing events.
///
/// Normal drops (duplicates, inactive subscriptions, filter misses) are not
/// errors; they are reported through [`crate::pipeline::Outcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol-level error from the core crate.
    #[error(transparent)]
    Core(#[from] herald_core::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error outside of protocol parsing (snapshots, fixtures).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delivery URI could not be built from the configured target.
    #[error("delivery error for configuration {configuration_id}: {reason}")]
    Delivery {
        /// Configuration whose target endpoint was unusable.
        configuration_id: String,
        /// What went wrong.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
