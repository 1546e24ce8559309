//! Application state for API handlers

use super::auth::AccessGate;
use meridian_config_store::ConfigResolver;
use meridian_registry::InstanceRegistry;
use meridian_replication::Replicator;
use std::sync::Arc;
use std::time::Duration;

/// HTTP limits applied by the router
#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub request_timeout: Duration,
    pub max_body_size: usize,
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Instance registry
    pub registry: Arc<dyn InstanceRegistry>,

    /// Config resolution
    pub resolver: Arc<ConfigResolver>,

    /// Credential check for non-public routes
    pub gate: AccessGate,

    /// Peer replication, when peers are configured
    pub replicator: Option<Arc<Replicator>>,

    pub limits: HttpLimits,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        registry: Arc<dyn InstanceRegistry>,
        resolver: Arc<ConfigResolver>,
        gate: AccessGate,
    ) -> Self {
        Self {
            registry,
            resolver,
            gate,
            replicator: None,
            limits: HttpLimits::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn with_replicator(mut self, replicator: Arc<Replicator>) -> Self {
        self.replicator = Some(replicator);
        self
    }

    pub fn with_limits(mut self, limits: HttpLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
