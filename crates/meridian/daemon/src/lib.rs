//! Meridian daemon library
//!
//! This module provides the core components for the Meridian daemon:
//! - REST API for registration, discovery and configuration
//! - Access control gate
//! - Eviction loop
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;

pub use api::create_router;
pub use api::rest::auth::{AccessGate, CredentialCheck, StaticCredentials};
pub use api::rest::state::{AppState, HttpLimits};
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use scheduler::Evictor;
pub use server::Server;
