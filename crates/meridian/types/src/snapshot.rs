//! Point-in-time registry snapshots
//!
//! A snapshot is an immutable copy of registry state together with the
//! registry version it was taken at. Clients compare versions to detect
//! staleness without re-fetching.

use crate::ids::{InstanceId, ServiceName};
use crate::instance::InstanceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instances of one service, ordered by instance id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service: ServiceName,
    pub instances: Vec<InstanceRecord>,
}

impl ServiceSnapshot {
    /// Instances currently accepting traffic
    pub fn routable(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.instances.iter().filter(|i| i.status.is_routable())
    }

    pub fn get(&self, id: &InstanceId) -> Option<&InstanceRecord> {
        self.instances.iter().find(|i| &i.instance_id == id)
    }
}

/// Versioned copy of (part of) the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Registry version at the time of the copy
    pub version: u64,

    /// When the copy was taken
    pub taken_at: Option<DateTime<Utc>>,

    /// Eviction was suspended when the copy was taken
    #[serde(default)]
    pub self_preservation: bool,

    /// Services keyed by name
    pub services: BTreeMap<ServiceName, ServiceSnapshot>,
}

impl RegistrySnapshot {
    pub fn service(&self, name: &ServiceName) -> Option<&ServiceSnapshot> {
        self.services.get(name)
    }

    /// Whether `service` has an instance with `id`
    pub fn contains(&self, service: &ServiceName, id: &InstanceId) -> bool {
        self.service(service)
            .map(|s| s.get(id).is_some())
            .unwrap_or(false)
    }

    /// All instances across services
    pub fn instances(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.services.values().flat_map(|s| s.instances.iter())
    }

    pub fn instance_count(&self) -> usize {
        self.services.values().map(|s| s.instances.len()).sum()
    }
}
