//! In-memory backend for embedding and tests

use super::ConfigBackend;
use crate::error::{ConfigStoreError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct Revision {
    id: String,
    files: BTreeMap<String, String>,
}

/// Labels held in memory, each pointing at one revision
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    labels: RwLock<HashMap<String, Revision>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `label` at a new revision with the given files
    pub fn publish<I, P, C>(&self, label: &str, revision: &str, files: I)
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let files = files
            .into_iter()
            .map(|(path, contents)| (path.into(), contents.into()))
            .collect();
        let revision = Revision {
            id: revision.to_string(),
            files,
        };

        if let Ok(mut labels) = self.labels.write() {
            labels.insert(label.to_string(), revision);
        }
    }

    fn find(&self, revision: &str) -> Result<Revision> {
        let labels = self
            .labels
            .read()
            .map_err(|_| ConfigStoreError::Unavailable("label table poisoned".into()))?;

        labels
            .values()
            .find(|r| r.id == revision)
            .cloned()
            .ok_or_else(|| ConfigStoreError::RevisionNotFound(revision.to_string()))
    }
}

#[async_trait]
impl ConfigBackend for InMemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn checkout(&self, label: &str) -> Result<String> {
        let labels = self
            .labels
            .read()
            .map_err(|_| ConfigStoreError::Unavailable("label table poisoned".into()))?;

        labels
            .get(label)
            .map(|r| r.id.clone())
            .ok_or_else(|| ConfigStoreError::RevisionNotFound(label.to_string()))
    }

    async fn list_files(&self, revision: &str) -> Result<Vec<String>> {
        Ok(self.find(revision)?.files.into_keys().collect())
    }

    async fn read_file(&self, revision: &str, path: &str) -> Result<String> {
        self.find(revision)?
            .files
            .remove(path)
            .ok_or_else(|| ConfigStoreError::InvalidPath(path.to_string()))
    }
}
