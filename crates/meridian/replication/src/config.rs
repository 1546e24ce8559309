//! Replication configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Base URLs of peer registries
    #[serde(default)]
    pub peers: Vec<String>,

    /// Interval between batch sends
    #[serde(default = "default_batch_interval")]
    pub batch_interval_ms: u64,

    /// Maximum events per batch
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Timeout for a single peer call
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Extra attempts for a failed batch before it is dropped
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Per-peer queue capacity; newer events are dropped when full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            batch_interval_ms: default_batch_interval(),
            max_batch: default_max_batch(),
            send_timeout_ms: default_send_timeout(),
            retry_limit: default_retry_limit(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ReplicationConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }

    pub fn is_enabled(&self) -> bool {
        !self.peers.is_empty()
    }
}

fn default_batch_interval() -> u64 {
    1000
}

fn default_max_batch() -> usize {
    256
}

fn default_send_timeout() -> u64 {
    2000
}

fn default_retry_limit() -> u32 {
    1
}

fn default_queue_capacity() -> usize {
    10_000
}
