//! Error types for queue operations.

use std::path::PathBuf;
use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage unavailable at '{}': {message}", path.display())]
    StorageUnavailable { path: PathBuf, message: String },

    #[error("Storage busy: {message}")]
    StorageBusy { message: String },

    #[error("Storage operation failed: {message}")]
    Storage { message: String },

    #[error("Failed to acquire lock '{}': {source}", path.display())]
    LockAcquisition {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored item is corrupt: {message}")]
    CorruptItem { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),
}

impl QueueError {
    /// Check if error is transient and the operation may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::StorageUnavailable { .. } => false,
            Self::StorageBusy { .. } => true,
            Self::Storage { .. } => false,
            Self::LockAcquisition { .. } => false,
            Self::CorruptItem { .. } => false,
            Self::Serialization(_) => false,
        }
    }
}

/// Errors during payload serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unknown queue discipline '{value}'. Only 'oldest-first' or 'newest-first' are valid")]
    UnknownDiscipline { value: String },

    #[error("Cannot resolve default storage location: {message}")]
    DefaultLocation { message: String },

    #[error("Backend '{backend}' is not supported by this build: {message}")]
    UnsupportedBackend { backend: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
