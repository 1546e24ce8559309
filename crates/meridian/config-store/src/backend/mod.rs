//! Backing stores for property files
//!
//! A backend maps a label (branch, tag, directory name) to a revision and
//! serves the flat list of files under that revision.

use crate::error::{ConfigStoreError, Result};
use async_trait::async_trait;

mod filesystem;
mod git;
mod memory;

pub use filesystem::FileSystemBackend;
pub use git::GitBackend;
pub use memory::InMemoryBackend;

/// Versioned store of property files
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Short backend name used in logs and `/info`
    fn kind(&self) -> &'static str;

    /// Pin a label to the revision subsequent reads use.
    ///
    /// Fails with `RevisionNotFound` when the label does not exist.
    async fn checkout(&self, label: &str) -> Result<String>;

    /// File names available at a revision
    async fn list_files(&self, revision: &str) -> Result<Vec<String>>;

    /// Contents of one file at a revision
    async fn read_file(&self, revision: &str, path: &str) -> Result<String>;
}

/// Reject labels and paths that could escape the store
pub(crate) fn validate_segment(value: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value.starts_with('/')
        || value.starts_with('-')
        || value.contains('\\')
        || value.contains('\0')
        || value.split('/').any(|part| part.is_empty() || part == "." || part == "..");

    if invalid {
        return Err(ConfigStoreError::InvalidPath(value.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("main").is_ok());
        assert!(validate_segment("release/1.0").is_ok());
        assert!(validate_segment("app-prod.yml").is_ok());
        assert!(validate_segment("../etc").is_err());
        assert!(validate_segment("/etc/passwd").is_err());
        assert!(validate_segment("--upload-pack=x").is_err());
        assert!(validate_segment("").is_err());
    }
}
