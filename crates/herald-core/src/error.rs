//! Error types for event validation and relay message parsing.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or validating protocol data.
#[derive(Error, Debug)]
pub enum Error {
    /// Event ID validation failed - computed ID doesn't match claimed ID.
    #[error("invalid event ID: computed {computed}, expected {expected}")]
    InvalidEventId {
        /// The ID we computed by hashing the event.
        computed: String,
        /// The ID claimed in the event.
        expected: String,
    },

    /// Event signature is invalid.
    #[error("invalid event signature: {0}")]
    InvalidSignature(String),

    /// Event has an invalid field format (e.g., wrong hex length).
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// Relay message envelope is malformed.
    #[error("invalid relay message: {0}")]
    InvalidMessage(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Hex decoding error.
    #[error("hex decode error: {0}")]
    HexDecode(String),
}

impl Error {
    /// True for errors produced by envelope parsing rather than event validation.
    pub fn is_envelope_error(&self) -> bool {
        matches!(self, Self::InvalidMessage(_) | Self::Json(_))
    }
}
