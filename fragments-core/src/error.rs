/*!
Error types for the fragments core.
*/

use thiserror::Error;

/// Result type used throughout the fragments core.
pub type Result<T> = std::result::Result<T, FragmentsError>;

/// Errors that can occur while validating, storing or converting fragments.
#[derive(Error, Debug)]
pub enum FragmentsError {
    /// Bad constructor or boundary input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A keyed store was addressed with an empty key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No metadata or payload exists at the given identity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content type outside the supported set
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// Requested target is not reachable from the source type
    #[error("Unsupported conversion from {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    /// Payload bytes that cannot be interpreted as their declared type
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The payload of an existing fragment could not be read
    #[error("Data unavailable for fragment {id}: {reason}")]
    DataUnavailable { id: String, reason: String },

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FragmentsError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid key error
    pub fn invalid_key<S: Into<String>>(msg: S) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new unsupported type error
    pub fn unsupported_type<S: Into<String>>(value: S) -> Self {
        Self::UnsupportedType(value.into())
    }

    /// Create a new unsupported conversion error
    pub fn unsupported_conversion<S1: Into<String>, S2: Into<String>>(from: S1, to: S2) -> Self {
        Self::UnsupportedConversion {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a new invalid payload error
    pub fn invalid_payload<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Create a new data unavailable error
    pub fn data_unavailable<S1: Into<String>, S2: Into<String>>(id: S1, reason: S2) -> Self {
        Self::DataUnavailable {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the caller caused this failure and should change its input
    /// rather than retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidKey(_)
                | Self::NotFound(_)
                | Self::UnsupportedType(_)
                | Self::UnsupportedConversion { .. }
                | Self::InvalidPayload(_)
        )
    }
}
