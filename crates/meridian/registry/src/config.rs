//! Registry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lease, eviction and propagation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Lease duration applied when a registration does not carry one
    #[serde(default = "default_lease_secs")]
    pub default_lease_secs: u64,

    /// An instance is evicted once `lease × multiplier` passes without renewal
    #[serde(default = "default_expiry_multiplier")]
    pub expiry_multiplier: u32,

    /// Interval between eviction passes
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,

    /// Capacity of the delta broadcast channel
    #[serde(default = "default_delta_buffer")]
    pub delta_buffer: usize,

    #[serde(default)]
    pub self_preservation: SelfPreservationConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_lease_secs: default_lease_secs(),
            expiry_multiplier: default_expiry_multiplier(),
            eviction_interval_secs: default_eviction_interval(),
            delta_buffer: default_delta_buffer(),
            self_preservation: SelfPreservationConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn default_lease(&self) -> Duration {
        Duration::from_secs(self.default_lease_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }
}

/// Self-preservation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfPreservationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fraction of expected renewals below which eviction is suspended
    #[serde(default = "default_renewal_percent")]
    pub renewal_percent_threshold: f64,

    /// How often each instance is expected to renew
    #[serde(default = "default_expected_interval")]
    pub expected_renewal_interval_secs: u64,

    /// Length of a renewal counting window
    #[serde(default = "default_window")]
    pub measurement_window_secs: u64,
}

impl Default for SelfPreservationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            renewal_percent_threshold: default_renewal_percent(),
            expected_renewal_interval_secs: default_expected_interval(),
            measurement_window_secs: default_window(),
        }
    }
}

impl SelfPreservationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.measurement_window_secs.max(1))
    }

    /// Minimum renewals per window for `instances` registered instances
    pub fn renewal_threshold(&self, instances: usize) -> u64 {
        let per_instance = self.measurement_window_secs as f64
            / self.expected_renewal_interval_secs.max(1) as f64;
        (instances as f64 * per_instance * self.renewal_percent_threshold).floor() as u64
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_lease_secs() -> u64 {
    30
}

fn default_expiry_multiplier() -> u32 {
    3
}

fn default_eviction_interval() -> u64 {
    5
}

fn default_delta_buffer() -> usize {
    1024
}

fn default_renewal_percent() -> f64 {
    0.85
}

fn default_expected_interval() -> u64 {
    30
}

fn default_window() -> u64 {
    60
}
