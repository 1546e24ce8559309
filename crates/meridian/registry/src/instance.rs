//! Instance registry trait and request/report types
//!
//! The InstanceRegistry is the authoritative store of instances and their
//! leases for one process.

use crate::error::Result;
use async_trait::async_trait;
use meridian_types::{
    DeltaEvent, InstanceId, InstanceKey, InstanceRecord, InstanceStatus, Lease, RegistrySnapshot,
    ServiceName,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

/// Registry for service instances
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    /// Insert or replace the record for (service, instance id) and start a new lease
    async fn register(&self, registration: Registration) -> Result<InstanceRecord>;

    /// Reset the lease clock of a live instance
    async fn renew(&self, service: &ServiceName, id: &InstanceId) -> Result<Lease>;

    /// Change status along an allowed edge
    async fn set_status(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<InstanceRecord>;

    /// Remove an instance immediately
    async fn deregister(
        &self,
        service: &ServiceName,
        id: &InstanceId,
    ) -> Result<InstanceRecord>;

    /// Remove instances whose lease has expired, unless self-preservation is active
    async fn evict(&self) -> Result<EvictionReport>;

    /// Immutable copy of the registry, optionally for a single service
    async fn snapshot(&self, service: Option<&ServiceName>) -> RegistrySnapshot;

    /// Get one instance
    async fn get(
        &self,
        service: &ServiceName,
        id: &InstanceId,
    ) -> Option<InstanceRecord>;

    /// Apply a delta received from a peer (last writer wins)
    async fn apply_replicated(&self, event: DeltaEvent) -> Result<ApplyOutcome>;

    /// Current registry version
    fn version(&self) -> u64;

    /// Whether eviction is currently suspended
    fn is_self_preserving(&self) -> bool;

    /// Subscribe to locally originated mutations
    fn subscribe(&self) -> broadcast::Receiver<DeltaEvent>;
}

/// A registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub service: ServiceName,
    pub instance_id: InstanceId,
    pub host: String,
    pub port: u16,

    #[serde(default)]
    pub secure: bool,

    /// Initial status; `STARTING` when absent
    #[serde(default)]
    pub status: Option<InstanceStatus>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Lease duration in seconds; registry default when absent
    #[serde(default)]
    pub lease_duration_secs: Option<u64>,
}

impl Registration {
    pub fn new(
        service: impl Into<ServiceName>,
        instance_id: impl Into<InstanceId>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.into(),
            host: host.into(),
            port,
            secure: false,
            status: None,
            metadata: HashMap::new(),
            lease_duration_secs: None,
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_lease(mut self, duration: Duration) -> Self {
        self.lease_duration_secs = Some(duration.as_secs());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            service: self.service.clone(),
            instance_id: self.instance_id.clone(),
        }
    }
}

/// Result of one eviction pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Instances removed in this pass
    pub evicted: Vec<InstanceKey>,

    /// Instances whose lease had expired (evicted or not)
    pub expired: usize,

    /// Eviction was suspended for this pass
    pub self_preservation: bool,
}

/// Result of applying a replicated delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Local state changed
    Applied,
    /// Local record is as new or newer; nothing changed
    Stale,
}
