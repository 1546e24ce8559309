//! Config store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for config store operations
pub type Result<T> = std::result::Result<T, ConfigStoreError>;
