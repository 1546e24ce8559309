//! Applying batches received from peers

use meridian_registry::{ApplyOutcome, InstanceRegistry, RegistryError};
use meridian_types::DeltaBatch;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-batch outcome counts returned to the sending peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAck {
    pub applied: usize,
    pub stale: usize,
    pub rejected: usize,
}

/// Apply every event of a peer batch in order
pub async fn apply_batch(registry: &dyn InstanceRegistry, batch: DeltaBatch) -> BatchAck {
    let mut ack = BatchAck::default();

    for event in batch.events {
        let id = event.id;
        let key = event.key();
        let kind = event.kind;
        match registry.apply_replicated(event).await {
            Ok(ApplyOutcome::Applied) => ack.applied += 1,
            Ok(ApplyOutcome::Stale) => ack.stale += 1,
            Err(RegistryError::Unavailable(reason)) => {
                debug!(event_id = %id, instance = %key, reason = %reason, "Deferred peer delta");
                ack.rejected += 1;
            }
            Err(e) => {
                warn!(event_id = %id, instance = %key, kind = ?kind, error = %e, "Rejected peer delta");
                ack.rejected += 1;
            }
        }
    }

    ack
}
