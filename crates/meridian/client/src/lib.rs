//! Meridian client
//!
//! Pull-based, cached access to the registry and the config server:
//!
//! - [`ClientCache`]: last-good snapshot cache refreshed in the background
//! - [`MeridianClient`]: thin HTTP client for the daemon's API
//! - [`HeartbeatAgent`]: keeps one instance registered and its lease renewed

#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod error;
pub mod fetch;
pub mod heartbeat;

pub use cache::{CachedValue, ClientCache, FetchOutcome, Fetcher};
pub use client::{ClientCredentials, MeridianClient};
pub use error::{ClientError, Result};
pub use fetch::{ConfigFetcher, RegistryFetcher, ServiceFetcher};
pub use heartbeat::HeartbeatAgent;
