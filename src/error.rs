//! Error types for the rewind library
//!
//! All fallible operations return [`Result<T>`] with [`RewindError`] as the
//! error type. Errors carry enough context to decide whether the failure is
//! a missing entity, an I/O problem, or corrupted persisted state.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the rewind library
pub type Result<T> = std::result::Result<T, RewindError>;

/// Main error type for all rewind operations
#[derive(Debug, Error)]
pub enum RewindError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Checkpoint not found in storage or timeline
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Content blob not found in the content pool
    #[error("Object not found in content pool: {0}")]
    ObjectNotFound(String),

    /// Project root directory does not exist
    #[error("Project root missing: {0:?}")]
    ProjectRootMissing(PathBuf),

    /// Timeline document exists but cannot be parsed
    #[error("Corrupt timeline document: {0}")]
    CorruptTimeline(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Restore operation failed
    #[error("Restore failed: {0}")]
    Restore(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RewindError {
    /// Create a storage error with a custom message
    pub fn storage(msg: impl Into<String>) -> Self {
        RewindError::Storage(msg.into())
    }

    /// Create a compression error with a custom message
    pub fn compression(msg: impl Into<String>) -> Self {
        RewindError::Compression(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        RewindError::Decompression(msg.into())
    }

    /// Create a restore error with a custom message
    pub fn restore(msg: impl Into<String>) -> Self {
        RewindError::Restore(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        RewindError::Internal(msg.into())
    }

    /// Check if this error means a requested entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RewindError::CheckpointNotFound(_)
                | RewindError::ObjectNotFound(_)
                | RewindError::ProjectRootMissing(_)
        )
    }
}
