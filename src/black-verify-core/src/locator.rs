//! Resolves a target into the artifacts to verify.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::config::{Target, VerifyConfig};
use crate::error::VerifyError;
use crate::evidence::is_evidence_file;
use crate::release::{ReleaseClient, ReleaseSource};
use crate::source::{AssetSource, LocalDirSource};
use crate::types::{Artifact, ContentRef};

/// Located artifacts plus the source their evidence is read from.
pub struct Located {
    /// Artifacts, sorted by file name.
    pub artifacts: Vec<Artifact>,
    /// Where artifact bytes and evidence files are fetched.
    pub source: Arc<dyn AssetSource>,
    /// Target description for reports.
    pub description: String,
}

impl std::fmt::Debug for Located {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Located")
            .field("artifacts", &self.artifacts)
            .field("source", &self.source.describe())
            .field("description", &self.description)
            .finish()
    }
}

/// Finds release artifacts on disk or through the release API.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    api_url: String,
    token: Option<String>,
    timeout: Duration,
    tag: Option<String>,
}

impl ArtifactLocator {
    /// Create a locator from the run configuration.
    pub fn new(config: &VerifyConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            timeout: config.fetch_timeout,
            tag: config.tag.clone(),
        }
    }

    /// Resolve `target`.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::NotFound`] if the target does not exist or holds no artifacts
    /// - [`VerifyError::Retrieval`] if listing fails
    #[instrument(skip_all, fields(target = %target.describe()))]
    pub async fn locate(&self, target: &Target) -> Result<Located, VerifyError> {
        let located = match target {
            Target::Local(path) => self.locate_local(path).await?,
            Target::Release { repository, tag } => self.locate_release(repository, tag).await?,
        };

        if located.artifacts.is_empty() {
            return Err(VerifyError::not_found(format!(
                "no artifacts found in {}",
                located.description
            )));
        }
        info!(
            artifacts = located.artifacts.len(),
            source = %located.source.describe(),
            "Located artifacts"
        );
        Ok(located)
    }

    async fn locate_local(&self, path: &Path) -> Result<Located, VerifyError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VerifyError::not_found(format!("{} does not exist", path.display())));
            },
            Err(e) => {
                return Err(VerifyError::retrieval(format!(
                    "failed to stat {}: {e}",
                    path.display()
                )));
            },
        };
        let version = self.declared_version();

        if metadata.is_file() {
            let name = file_name(path)?;
            if is_evidence_file(&name) {
                return Err(VerifyError::not_found(format!(
                    "{name} is an evidence file, not an artifact"
                )));
            }
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            return Ok(Located {
                artifacts: vec![Artifact {
                    name,
                    version,
                    content: ContentRef::Local {
                        path: path.to_path_buf(),
                    },
                    size: metadata.len(),
                    declared_digest: None,
                }],
                source: Arc::new(LocalDirSource::new(parent)),
                description: path.display().to_string(),
            });
        }

        let mut entries = tokio::fs::read_dir(path).await.map_err(|e| {
            VerifyError::retrieval(format!("failed to list {}: {e}", path.display()))
        })?;
        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VerifyError::retrieval(format!("failed to list {}: {e}", path.display())))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || is_evidence_file(&name) {
                continue;
            }
            // Follows symlinks, unlike `DirEntry::metadata`.
            let meta = tokio::fs::metadata(entry.path()).await.map_err(|e| {
                VerifyError::retrieval(format!("failed to stat {name}: {e}"))
            })?;
            if !meta.is_file() {
                continue;
            }
            debug!(artifact = %name, size = meta.len(), "Found local artifact");
            artifacts.push(Artifact {
                name,
                version: version.clone(),
                content: ContentRef::Local { path: entry.path() },
                size: meta.len(),
                declared_digest: None,
            });
        }
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Located {
            artifacts,
            source: Arc::new(LocalDirSource::new(path)),
            description: path.display().to_string(),
        })
    }

    async fn locate_release(&self, repository: &str, tag: &str) -> Result<Located, VerifyError> {
        let client = ReleaseClient::new(&self.api_url, self.token.clone(), self.timeout)?;
        let release = client.find_release(repository, tag).await?;
        let version = Some(strip_v(tag).to_string());

        let mut artifacts: Vec<Artifact> = release
            .assets
            .iter()
            .filter(|a| !is_evidence_file(&a.name))
            .map(|a| Artifact {
                name: a.name.clone(),
                version: version.clone(),
                content: ContentRef::Remote {
                    url: a.browser_download_url.clone(),
                },
                size: a.size,
                declared_digest: a.digest.clone(),
            })
            .collect();
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));

        let source = ReleaseSource::new(client, repository, &release);
        Ok(Located {
            artifacts,
            description: source.describe(),
            source: Arc::new(source),
        })
    }

    fn declared_version(&self) -> Option<String> {
        self.tag.as_deref().map(|t| strip_v(t).to_string())
    }
}

fn strip_v(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

fn file_name(path: &Path) -> Result<String, VerifyError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| VerifyError::not_found(format!("{} has no file name", path.display())))
}
