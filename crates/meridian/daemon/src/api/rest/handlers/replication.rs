//! Peer replication endpoint

use crate::api::rest::extract::ApiJson;
use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use meridian_replication::{apply_batch, BatchAck};
use meridian_types::DeltaBatch;
use tracing::debug;

/// Apply a batch of deltas sent by a peer
pub async fn receive_batch(
    State(state): State<AppState>,
    ApiJson(batch): ApiJson<DeltaBatch>,
) -> Json<BatchAck> {
    let events = batch.events.len();
    let ack = apply_batch(state.registry.as_ref(), batch).await;
    debug!(
        events = events,
        applied = ack.applied,
        stale = ack.stale,
        rejected = ack.rejected,
        "Applied peer batch"
    );
    Json(ack)
}
