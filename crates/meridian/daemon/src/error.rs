//! Error types for meridian-daemon

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use meridian_config_store::ConfigStoreError;
use meridian_registry::RegistryError;
use meridian_replication::ReplicationError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Backing store unusable at boot
    #[error("Config store error: {0}")]
    ConfigStore(#[from] ConfigStoreError),

    /// Replication setup error
    #[error("Replication error: {0}")]
    Replication(#[from] ReplicationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Status change not permitted from the current status
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Dependency unavailable or write refused
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Config label does not exist
    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    /// No property sources for the application
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(key) => ApiError::NotFound(key.to_string()),
            e @ RegistryError::InvalidTransition { .. } => ApiError::InvalidTransition(e.to_string()),
            RegistryError::InvalidRegistration(msg) | RegistryError::InvalidDelta(msg) => {
                ApiError::BadRequest(msg)
            }
            RegistryError::Unavailable(msg) => ApiError::Unavailable(msg),
        }
    }
}

impl From<ConfigStoreError> for ApiError {
    fn from(err: ConfigStoreError) -> Self {
        match err {
            ConfigStoreError::RevisionNotFound(label) => ApiError::RevisionNotFound(label),
            ConfigStoreError::ApplicationNotFound(app) => ApiError::ApplicationNotFound(app),
            ConfigStoreError::InvalidPath(path) => ApiError::BadRequest(format!("invalid path: {}", path)),
            e @ ConfigStoreError::Unavailable(_) => ApiError::Unavailable(e.to_string()),
            e @ (ConfigStoreError::Parse { .. } | ConfigStoreError::Io(_)) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::RevisionNotFound(_) => (StatusCode::NOT_FOUND, "REVISION_NOT_FOUND"),
            ApiError::ApplicationNotFound(_) => (StatusCode::NOT_FOUND, "APPLICATION_NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        if status == StatusCode::UNAUTHORIZED {
            return (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"meridian\"")],
                Json(body),
            )
                .into_response();
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
