//! Git repository backend
//!
//! Labels are anything `git rev-parse` accepts (branch, tag, commit). Files
//! are read straight from the object store, so the working tree is never
//! touched and a label always resolves to one immutable commit.

use super::{validate_segment, ConfigBackend};
use crate::error::{ConfigStoreError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

pub struct GitBackend {
    repository: PathBuf,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitBackend {
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    async fn git(&self, args: &[&str]) -> Result<GitOutput> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repository)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ConfigStoreError::Unavailable(format!("failed to run git: {}", e)))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl ConfigBackend for GitBackend {
    fn kind(&self) -> &'static str {
        "git"
    }

    async fn checkout(&self, label: &str) -> Result<String> {
        validate_segment(label)?;
        let spec = format!("{}^{{commit}}", label);
        let output = self.git(&["rev-parse", "--verify", "--quiet", &spec]).await?;

        if !output.success {
            debug!(label = %label, stderr = %output.stderr, "Label did not resolve");
            return Err(ConfigStoreError::RevisionNotFound(label.to_string()));
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn list_files(&self, revision: &str) -> Result<Vec<String>> {
        validate_segment(revision)?;
        let output = self.git(&["ls-tree", "--name-only", revision]).await?;
        if !output.success {
            return Err(ConfigStoreError::Unavailable(output.stderr));
        }

        let mut files: Vec<String> = output
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        files.sort();
        Ok(files)
    }

    async fn read_file(&self, revision: &str, path: &str) -> Result<String> {
        validate_segment(revision)?;
        validate_segment(path)?;
        let object = format!("{}:{}", revision, path);
        let output = self.git(&["show", &object]).await?;
        if !output.success {
            return Err(ConfigStoreError::Unavailable(output.stderr));
        }
        Ok(output.stdout)
    }
}
