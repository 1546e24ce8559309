//! Delta events used for peer propagation

use crate::ids::{InstanceId, InstanceKey, ServiceName};
use crate::instance::InstanceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of registry mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Register,
    Renew,
    Status,
    Evict,
    Deregister,
}

impl DeltaKind {
    /// Mutations that remove the instance
    pub fn is_removal(self) -> bool {
        matches!(self, DeltaKind::Evict | DeltaKind::Deregister)
    }
}

/// A single recorded registry mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEvent {
    /// Unique event id (for tracing across peers)
    pub id: Uuid,

    pub kind: DeltaKind,
    pub service: ServiceName,
    pub instance_id: InstanceId,

    /// When the mutation happened on the originating node
    pub timestamp: DateTime<Utc>,

    /// Record state after the mutation (absent for removals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<InstanceRecord>,
}

impl DeltaEvent {
    /// Delta carrying the post-mutation record
    pub fn upsert(kind: DeltaKind, record: &InstanceRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            service: record.service.clone(),
            instance_id: record.instance_id.clone(),
            timestamp: record.last_updated,
            record: Some(record.clone()),
        }
    }

    /// Delta for a removed instance
    pub fn removal(kind: DeltaKind, key: InstanceKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            service: key.service,
            instance_id: key.instance_id,
            timestamp,
            record: None,
        }
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            service: self.service.clone(),
            instance_id: self.instance_id.clone(),
        }
    }
}

/// Wire form of a batch of deltas sent to a peer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaBatch {
    pub events: Vec<DeltaEvent>,
}
