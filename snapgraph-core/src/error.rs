/*!
Error types for the snapgraph core engine.

Only fatal conditions are represented here. Recoverable conditions during a
load (missing templates, unresolved references, aborted sections) are logged
and counted in [`LoadReport`](crate::LoadReport) instead.
*/

use thiserror::Error;

/// Result type used throughout the snapgraph core.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// I/O errors during stream or file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors (text format and field values)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encoding errors
    #[error("Binary encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Binary decoding errors
    #[error("Binary decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Invalid snapshot format
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A transient index outside the registered range
    #[error("Reference index {index} out of range (registered: {len})")]
    IndexOutOfRange { index: u32, len: usize },

    /// A component field could not be encoded or decoded
    #[error("Field '{field}' of {owner}: {reason}")]
    Field {
        owner: String,
        field: String,
        reason: String,
    },
}

impl SnapshotError {
    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new field error
    pub fn field<O, F, R>(owner: O, field: F, reason: R) -> Self
    where
        O: Into<String>,
        F: Into<String>,
        R: Into<String>,
    {
        Self::Field {
            owner: owner.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
