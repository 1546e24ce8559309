//! HTTP request and response bodies shared by the daemon and its clients

use crate::ids::ServiceName;
use crate::instance::{InstanceRecord, InstanceStatus};
use crate::snapshot::RegistrySnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `PUT /instances/{service}/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub host: String,
    pub port: u16,

    #[serde(default)]
    pub secure: bool,

    /// Initial status; `STARTING` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Lease duration in seconds; server default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_secs: Option<u64>,
}

/// Body of `PUT /instances/{service}/{id}/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: InstanceStatus,
}

/// Response of `GET /instances/{service}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstances {
    pub version: u64,
    pub service: ServiceName,

    #[serde(default)]
    pub self_preservation: bool,

    pub instances: Vec<InstanceRecord>,
}

impl ServiceInstances {
    /// Cut one service out of a snapshot; empty when the service is unknown
    pub fn from_snapshot(service: ServiceName, snapshot: &RegistrySnapshot) -> Self {
        let instances = snapshot
            .service(&service)
            .map(|s| s.instances.clone())
            .unwrap_or_default();

        Self {
            version: snapshot.version,
            service,
            self_preservation: snapshot.self_preservation,
            instances,
        }
    }
}
