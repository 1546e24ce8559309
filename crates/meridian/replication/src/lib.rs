//! Meridian Replication - Eventually consistent registry peers
//!
//! Every locally originated registry mutation is fanned out to one worker per
//! configured peer. Each worker batches deltas and forwards them on a fixed
//! interval with a per-call timeout; failed batches are retried a bounded
//! number of times and then dropped, since renewal traffic heals any gap.
//!
//! Received deltas are applied last-writer-wins on the record timestamp,
//! which trades rare lost updates under conflicting writes for not needing
//! a consensus protocol.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod apply;
pub mod config;
pub mod error;
pub mod replicator;
pub mod transport;

pub use apply::{apply_batch, BatchAck};
pub use config::ReplicationConfig;
pub use error::{ReplicationError, Result};
pub use replicator::{PeerHealth, Replicator};
pub use transport::{HttpPeerTransport, PeerCredentials, PeerEndpoint, PeerTransport};
