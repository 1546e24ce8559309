//! Request resolution
//!
//! Sources are collected lowest precedence first:
//! `application.*`, `<app>.*`, then `application-<p>.*`, `<app>-<p>.*` for
//! each requested profile in order. Within one base name `.yaml` loses to
//! `.yml`, which loses to `.properties`.

use crate::backend::ConfigBackend;
use crate::error::{ConfigStoreError, Result};
use crate::source::{parse_source, EXTENSIONS};
use meridian_types::{ConfigDocument, ConfigRequest, PropertySource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Name of the source shared by every application
pub const SHARED_APPLICATION: &str = "application";

/// What to do when no application-specific source exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingApplicationPolicy {
    /// Fail with `ApplicationNotFound`
    #[default]
    Reject,
    /// Answer with whatever shared sources exist
    Empty,
}

/// Resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStoreConfig {
    /// Label used when a request names none
    #[serde(default = "default_label")]
    pub default_label: String,

    #[serde(default)]
    pub missing_application: MissingApplicationPolicy,

    /// Timeout for each backing-store call in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_label() -> String {
    "main".to_string()
}

fn default_read_timeout_ms() -> u64 {
    5000
}

impl Default for ConfigStoreConfig {
    fn default() -> Self {
        Self {
            default_label: default_label(),
            missing_application: MissingApplicationPolicy::default(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl ConfigStoreConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Resolves config requests against a backend
pub struct ConfigResolver {
    backend: Arc<dyn ConfigBackend>,
    config: ConfigStoreConfig,
}

impl ConfigResolver {
    pub fn new(backend: Arc<dyn ConfigBackend>, config: ConfigStoreConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn config(&self) -> &ConfigStoreConfig {
        &self.config
    }

    /// Resolve the default label; used as a boot-time reachability check
    pub async fn probe(&self) -> Result<String> {
        let label = self.config.default_label.clone();
        self.timed("checkout", self.backend.checkout(&label)).await
    }

    /// Resolve a request into a document
    pub async fn resolve(&self, request: &ConfigRequest) -> Result<ConfigDocument> {
        let label = request
            .label
            .clone()
            .unwrap_or_else(|| self.config.default_label.clone());

        let revision = self.timed("checkout", self.backend.checkout(&label)).await?;
        let available: HashSet<String> = self
            .timed("list", self.backend.list_files(&revision))
            .await?
            .into_iter()
            .collect();

        let mut property_sources = Vec::new();
        let mut application_specific = false;

        for (base, specific) in candidate_bases(&request.application, &request.profiles) {
            for ext in EXTENSIONS {
                let file = format!("{}.{}", base, ext);
                if !available.contains(&file) {
                    continue;
                }

                let contents = self
                    .timed("read", self.backend.read_file(&revision, &file))
                    .await?;
                let properties = parse_source(&file, &contents)?;
                application_specific |= specific;
                property_sources.push(PropertySource {
                    name: format!("{}:{}", label, file),
                    properties,
                });
            }
        }

        if !application_specific && self.config.missing_application == MissingApplicationPolicy::Reject
        {
            debug!(
                application = %request.application,
                label = %label,
                "No property sources for application"
            );
            return Err(ConfigStoreError::ApplicationNotFound(
                request.application.clone(),
            ));
        }

        debug!(
            application = %request.application,
            label = %label,
            revision = %revision,
            sources = property_sources.len(),
            "Resolved configuration"
        );

        Ok(ConfigDocument {
            name: request.application.clone(),
            profiles: request.profiles.clone(),
            label,
            revision: Some(revision),
            property_sources,
        })
    }

    async fn timed<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.read_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ConfigStoreError::Unavailable(format!(
                "{} backend {} timed out after {}ms",
                self.backend.kind(),
                op,
                timeout.as_millis()
            ))),
        }
    }
}

/// File base names in precedence order, flagged when application-specific
fn candidate_bases(application: &str, profiles: &[String]) -> Vec<(String, bool)> {
    let shared_only = application == SHARED_APPLICATION;
    let mut bases = vec![(SHARED_APPLICATION.to_string(), shared_only)];
    if !shared_only {
        bases.push((application.to_string(), true));
    }

    for profile in profiles {
        bases.push((format!("{}-{}", SHARED_APPLICATION, profile), shared_only));
        if !shared_only {
            bases.push((format!("{}-{}", application, profile), true));
        }
    }

    bases
}
