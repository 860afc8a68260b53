//! Artifact content retrieval.

use std::fmt;

use async_trait::async_trait;
use black_crypto::digest::sha256_hex;
use tracing::debug;

use super::{Evidence, EvidenceFetcher, Fetched};
use crate::error::VerifyError;
use crate::source::AssetSource;
use crate::types::{Artifact, EvidenceKind};

/// The artifact's bytes and their SHA-256 digest.
#[derive(Clone)]
pub struct ArtifactContent {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`.
    pub sha256: String,
}

impl ArtifactContent {
    /// Wrap bytes, computing the digest.
    pub fn new(bytes: Vec<u8>) -> Self {
        let sha256 = sha256_hex(&bytes);
        Self { bytes, sha256 }
    }

    /// Byte length.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the artifact is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ArtifactContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactContent")
            .field("len", &self.bytes.len())
            .field("sha256", &self.sha256)
            .finish()
    }
}

/// Reads the artifact itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentFetcher;

#[async_trait]
impl EvidenceFetcher for ContentFetcher {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Content
    }

    async fn fetch(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        match source.fetch(&artifact.name).await? {
            Some(bytes) => {
                let content = ArtifactContent::new(bytes);
                debug!(artifact = %artifact.name, sha256 = %content.sha256, "Read artifact content");
                Ok(Fetched::Found(Evidence::Content(content)))
            },
            None => Ok(Fetched::Missing(format!(
                "artifact {} is no longer available in {}",
                artifact.name,
                source.describe()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_digest() {
        let content = ArtifactContent::new(b"hello".to_vec());
        assert_eq!(
            content.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(content.len(), 5);
        assert!(format!("{content:?}").contains("len: 5"));
    }
}
