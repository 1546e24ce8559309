//! Configuration documents
//!
//! A ConfigDocument is derived per request from the backing store; it is
//! never persisted. Property sources are ordered lowest precedence first, so
//! a later source overrides an earlier one for the same key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the profile that means "no extra profile"
pub const DEFAULT_PROFILE: &str = "default";

/// A configuration request: (application, profiles, label)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub application: String,

    /// Profiles in precedence order (later wins)
    pub profiles: Vec<String>,

    /// Revision label; `None` selects the configured default
    pub label: Option<String>,
}

impl ConfigRequest {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            profiles: Vec::new(),
            label: None,
        }
    }

    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Parse a comma-separated profile list; `default` and blanks are dropped
    pub fn parse_profiles(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty() && *p != DEFAULT_PROFILE)
            .map(str::to_string)
            .collect()
    }
}

/// One file's worth of properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySource {
    /// Source name, e.g. `main:app-prod.yml`
    pub name: String,
    pub properties: BTreeMap<String, Value>,
}

/// Resolved configuration for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Application name
    pub name: String,
    pub profiles: Vec<String>,
    pub label: String,

    /// Backing-store revision the document was resolved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Lowest precedence first
    pub property_sources: Vec<PropertySource>,
}

impl ConfigDocument {
    /// Merge all sources; later sources override earlier ones
    pub fn resolved(&self) -> BTreeMap<String, Value> {
        let mut merged = BTreeMap::new();
        for source in &self.property_sources {
            for (key, value) in &source.properties {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Look up a single resolved property
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.property_sources
            .iter()
            .rev()
            .find_map(|s| s.properties.get(key))
    }

    pub fn is_empty(&self) -> bool {
        self.property_sources.is_empty()
    }
}
