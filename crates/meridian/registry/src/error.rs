//! Registry error types

use meridian_types::{InstanceKey, InstanceStatus};
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Unknown instance; the client should re-register
    #[error("Instance not found: {0}")]
    NotFound(InstanceKey),

    #[error("Invalid status transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: InstanceKey,
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Invalid delta event: {0}")]
    InvalidDelta(String),

    /// Write refused, e.g. a peer eviction during self-preservation
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
