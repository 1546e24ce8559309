//! Directory-per-label backend
//!
//! `<root>/<label>/<file>`; the revision reported is the label itself.

use super::{validate_segment, ConfigBackend};
use crate::error::{ConfigStoreError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct FileSystemBackend {
    root: PathBuf,
}

impl FileSystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn label_dir(&self, label: &str) -> Result<PathBuf> {
        validate_segment(label)?;
        Ok(self.root.join(label))
    }
}

#[async_trait]
impl ConfigBackend for FileSystemBackend {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    async fn checkout(&self, label: &str) -> Result<String> {
        let dir = self.label_dir(label)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(label.to_string()),
            Ok(_) => Err(ConfigStoreError::RevisionNotFound(label.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigStoreError::RevisionNotFound(label.to_string()))
            }
            Err(e) => Err(ConfigStoreError::Unavailable(format!(
                "{}: {}",
                dir.display(),
                e
            ))),
        }
    }

    async fn list_files(&self, revision: &str) -> Result<Vec<String>> {
        let dir = self.label_dir(revision)?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn read_file(&self, revision: &str, path: &str) -> Result<String> {
        validate_segment(path)?;
        let file = self.label_dir(revision)?.join(path);
        Ok(tokio::fs::read_to_string(file).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_labels_are_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("main")).unwrap();
        std::fs::write(dir.path().join("main/app.yml"), "timeout: 30\n").unwrap();
        std::fs::create_dir(dir.path().join("main/nested")).unwrap();

        let backend = FileSystemBackend::new(dir.path());
        assert_eq!(backend.checkout("main").await.unwrap(), "main");
        assert_eq!(backend.list_files("main").await.unwrap(), vec!["app.yml"]);
        assert_eq!(
            backend.read_file("main", "app.yml").await.unwrap(),
            "timeout: 30\n"
        );
        assert!(matches!(
            backend.checkout("release").await,
            Err(ConfigStoreError::RevisionNotFound(_))
        ));
        assert!(matches!(
            backend.read_file("main", "../main/app.yml").await,
            Err(ConfigStoreError::InvalidPath(_))
        ));
    }
}
