//! Meridian Types - Core types shared by the registry, the config store and clients
//!
//! Meridian is a service-registry and dynamic-configuration backbone:
//! instances self-register and heartbeat against a registry, clients pull
//! cached snapshots of that registry, and applications fetch layered
//! configuration resolved from a versioned backing store.
//!
//! ## Key Concepts
//!
//! - **InstanceRecord**: one registered instance of a service, with its lease
//! - **Lease**: time-bounded liveness promise, renewed by heartbeats
//! - **RegistrySnapshot**: versioned point-in-time copy of the registry
//! - **DeltaEvent**: a single registry mutation, propagated to peers
//! - **ConfigDocument**: configuration for (application, profiles, label)

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod config;
pub mod delta;
pub mod ids;
pub mod instance;
pub mod snapshot;

// Re-export main types
pub use api::{RegisterRequest, ServiceInstances, StatusUpdate};
pub use config::{ConfigDocument, ConfigRequest, PropertySource};
pub use delta::{DeltaBatch, DeltaEvent, DeltaKind};
pub use ids::{InstanceId, InstanceKey, ServiceName};
pub use instance::{InstanceRecord, InstanceStatus, Lease, StatusParseError};
pub use snapshot::{RegistrySnapshot, ServiceSnapshot};
