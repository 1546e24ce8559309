//! Meridian Registry - Authoritative in-process store of service instances
//!
//! This crate provides:
//!
//! - **InstanceRegistry**: register / renew / status / deregister / evict / snapshot
//! - **InMemoryInstanceRegistry**: per-service partitioned implementation
//! - **RenewalMeter**: heartbeat-rate tracking behind self-preservation
//! - **Clock**: injectable time source so lease logic is testable
//!
//! ## Self-preservation
//!
//! When the observed renewal rate drops below a configured fraction of the
//! expected rate, the registry assumes a network partition rather than mass
//! instance death and suspends eviction until the rate recovers.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod clock;
pub mod config;
pub mod error;
pub mod instance;
pub mod memory;
pub mod preservation;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RegistryConfig, SelfPreservationConfig};
pub use error::{RegistryError, Result};
pub use instance::{ApplyOutcome, EvictionReport, InstanceRegistry, Registration};
pub use memory::InMemoryInstanceRegistry;
pub use preservation::RenewalMeter;
