//! Configuration for meridian-daemon

use meridian_config_store::{ConfigStoreConfig, MissingApplicationPolicy};
use meridian_registry::RegistryConfig;
use meridian_replication::ReplicationConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Leases, eviction and self-preservation
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Peer propagation
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Configuration backing store
    #[serde(default)]
    pub config_store: ConfigStoreSettings,

    /// Access control
    #[serde(default)]
    pub security: SecurityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Where property files come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// One directory per label under `root`
    Filesystem { root: PathBuf },

    /// A local git repository; labels are branches, tags or commits
    Git { repository: PathBuf },

    /// Empty in-memory store (embedding and tests)
    Memory,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Filesystem {
            root: PathBuf::from("config-repo"),
        }
    }
}

/// Config store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStoreSettings {
    #[serde(default)]
    pub backend: BackendConfig,

    /// Label used when a request names none
    #[serde(default = "default_label")]
    pub default_label: String,

    #[serde(default)]
    pub missing_application: MissingApplicationPolicy,

    /// Timeout for each backing-store call in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Refuse to start when the default label cannot be read
    #[serde(default = "default_true")]
    pub required_at_boot: bool,
}

impl Default for ConfigStoreSettings {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            default_label: default_label(),
            missing_application: MissingApplicationPolicy::default(),
            read_timeout_ms: default_read_timeout(),
            required_at_boot: true,
        }
    }
}

impl ConfigStoreSettings {
    pub fn resolver_config(&self) -> ConfigStoreConfig {
        ConfigStoreConfig {
            default_label: self.default_label.clone(),
            missing_application: self.missing_application,
            read_timeout_ms: self.read_timeout_ms,
        }
    }
}

/// Access control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Require credentials on non-public routes
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_username")]
    pub username: String,

    /// Generated at startup when absent
    #[serde(default)]
    pub password: Option<String>,

    /// Routes reachable without credentials
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,

    /// Timeout for one credential check in milliseconds
    #[serde(default = "default_check_timeout")]
    pub check_timeout_ms: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            username: default_username(),
            password: None,
            public_paths: default_public_paths(),
            check_timeout_ms: default_check_timeout(),
        }
    }
}

impl SecurityConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8761))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024
}

fn default_label() -> String {
    "main".to_string()
}

fn default_read_timeout() -> u64 {
    5000
}

fn default_username() -> String {
    "meridian".to_string()
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/info".to_string()]
}

fn default_check_timeout() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the file at `path`, then
    /// `MERIDIAN_*` environment variables (`__` separates sections)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // e.g. MERIDIAN_REGISTRY__EXPIRY_MULTIPLIER=3
        builder = builder.add_source(
            config::Environment::with_prefix("MERIDIAN")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("replication.peers")
                .with_list_parse_key("security.public_paths")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Local single-node setup with the in-memory backend and auth disabled
    pub fn development() -> Self {
        Self {
            config_store: ConfigStoreSettings {
                backend: BackendConfig::Memory,
                required_at_boot: false,
                ..Default::default()
            },
            security: SecurityConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
