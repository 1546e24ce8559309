//! Instance records and the lease state machine
//!
//! An InstanceRecord is one registered instance of a service. Its status
//! moves through a small set of client-driven edges; its lease is renewed by
//! heartbeats and expires when they stop.

use crate::ids::{InstanceId, InstanceKey, ServiceName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Instance lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Registered but not yet accepting traffic
    Starting,
    /// Serving traffic
    Up,
    /// Reported unhealthy by the instance itself
    Down,
    /// Deliberately taken out of rotation
    OutOfService,
    /// Status not known (e.g. materialized from a peer without one)
    Unknown,
}

impl InstanceStatus {
    /// Whether a client may move an instance from `self` to `next`.
    ///
    /// Setting the current status again is always allowed.
    pub fn can_transition_to(self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Starting, Up)
                | (Up, Down)
                | (Up, OutOfService)
                | (Down, Up)
                | (OutOfService, Up)
                | (Unknown, _)
        )
    }

    /// Whether instances in this status should receive traffic
    pub fn is_routable(self) -> bool {
        matches!(self, InstanceStatus::Up)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl Default for InstanceStatus {
    fn default() -> Self {
        InstanceStatus::Starting
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a status string
#[derive(Debug, Error)]
#[error("Unknown instance status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for InstanceStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "STARTING" => Ok(InstanceStatus::Starting),
            "UP" => Ok(InstanceStatus::Up),
            "DOWN" => Ok(InstanceStatus::Down),
            "OUT_OF_SERVICE" => Ok(InstanceStatus::OutOfService),
            "UNKNOWN" => Ok(InstanceStatus::Unknown),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

/// Lease held by an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// When the instance (last) registered
    pub registered_at: DateTime<Utc>,

    /// Last heartbeat; never moves backwards
    pub last_renewed_at: DateTime<Utc>,

    /// Lease duration in seconds
    pub duration_secs: u64,

    /// Set once the registry evicts the instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evicted_at: Option<DateTime<Utc>>,
}

impl Lease {
    pub fn new(now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            registered_at: now,
            last_renewed_at: now,
            duration_secs: duration.as_secs(),
            evicted_at: None,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Reset the lease clock. Returns the renewal timestamp actually recorded.
    pub fn renew(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now > self.last_renewed_at {
            self.last_renewed_at = now;
        }
        self.last_renewed_at
    }

    /// Instant after which the lease counts as expired
    pub fn expires_at(&self, expiry_multiplier: u32) -> DateTime<Utc> {
        let window = self.duration_secs.saturating_mul(u64::from(expiry_multiplier));
        i64::try_from(window)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|window| self.last_renewed_at.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Elapsed time since last renewal strictly exceeds duration × multiplier
    pub fn is_expired(&self, now: DateTime<Utc>, expiry_multiplier: u32) -> bool {
        now > self.expires_at(expiry_multiplier)
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted_at.is_some()
    }
}

/// A registered service instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub service: ServiceName,
    pub instance_id: InstanceId,

    /// Network location
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,

    pub status: InstanceStatus,
    pub lease: Lease,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Timestamp of the last mutation (used for last-writer-wins)
    pub last_updated: DateTime<Utc>,

    /// Lease expired but kept because eviction was suspended
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lease_expired: bool,
}

impl InstanceRecord {
    pub fn new(
        service: impl Into<ServiceName>,
        instance_id: impl Into<InstanceId>,
        host: impl Into<String>,
        port: u16,
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.into(),
            host: host.into(),
            port,
            secure: false,
            status: InstanceStatus::Starting,
            lease: Lease::new(now, lease_duration),
            metadata: HashMap::new(),
            last_updated: now,
            lease_expired: false,
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
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

    /// Base URL clients use to reach the instance
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
