//! Dependency document resolution
//!
//! Dependencies are extra configuration documents applied before the main
//! one. They are resolved only when the session configuration lists none.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kubetest_common::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::session::Session;

/// File extensions treated as configuration documents
const MANIFEST_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Supplies dependency document URLs for a session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// URLs of the documents `session` depends on
    async fn resolve(&self, session: &Session) -> Result<Vec<String>, Error>;
}

/// Resolver for sessions without dependencies
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDependencies;

#[async_trait]
impl DependencyResolver for NoDependencies {
    async fn resolve(&self, _session: &Session) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }
}

/// Every manifest file in a directory, sorted by file name.
#[derive(Clone, Debug)]
pub struct ManifestDirResolver {
    dir: PathBuf,
}

impl ManifestDirResolver {
    /// Resolve manifests from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory being scanned
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DependencyResolver for ManifestDirResolver {
    async fn resolve(&self, _session: &Session) -> Result<Vec<String>, Error> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "manifest directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::io(format!("read {}", self.dir.display()), e));
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(format!("read {}", self.dir.display()), e))?
        {
            let path = entry.path();
            if path.is_file() && is_manifest(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        debug!(dir = %self.dir.display(), count = paths.len(), "resolved dependency manifests");
        Ok(paths
            .into_iter()
            .map(|p| format!("file://{}", p.display()))
            .collect())
    }
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e))
}
