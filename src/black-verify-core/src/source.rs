//! Asset sources: where artifacts and their evidence files are read from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::VerifyError;

/// Read access to the files published alongside an artifact.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Human-readable location, e.g. a directory or `owner/name@tag`.
    fn describe(&self) -> String;

    /// Fetch an asset by file name.
    ///
    /// Returns `Ok(None)` when the asset does not exist.
    async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>, VerifyError>;

    /// Local filesystem path of an asset, when the source is on disk.
    fn local_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// A directory of downloaded release assets.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetSource for LocalDirSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>, VerifyError> {
        // Asset names never contain separators; refuse anything that would escape the root.
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Ok(None);
        }
        let path = self.root.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), size = bytes.len(), "Read local asset");
                Ok(Some(bytes))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VerifyError::retrieval(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn local_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.root.join(name);
        path.is_file().then_some(path)
    }
}
