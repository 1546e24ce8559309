//! Replication error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Peer {peer} unreachable: {message}")]
    Unreachable { peer: String, message: String },

    #[error("Peer {peer} timed out after {timeout_ms}ms")]
    Timeout { peer: String, timeout_ms: u64 },

    #[error("Peer {peer} rejected batch with status {status}")]
    Rejected { peer: String, status: u16 },

    #[error("Invalid peer endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for replication operations
pub type Result<T> = std::result::Result<T, ReplicationError>;
