//! Client error types

use meridian_types::InstanceKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Cache has never been populated
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Renewal for an instance the server does not know
    #[error("Instance not registered: {0}")]
    NotRegistered(InstanceKey),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
