//! Checksum manifests (`SHA256SUMS` and friends).

use async_trait::async_trait;
use black_crypto::{normalize_hex, DigestAlgorithm};
use tracing::debug;

use super::{Evidence, EvidenceFetcher, Fetched};
use crate::error::VerifyError;
use crate::source::AssetSource;
use crate::types::{Artifact, EvidenceKind};

/// Release-wide manifests, tried in order.
pub const MANIFEST_NAMES: &[&str] = &[
    "SHA256SUMS",
    "SHA256SUMS.txt",
    "sha256sums.txt",
    "SHA512SUMS",
    "SHA512SUMS.txt",
    "checksums.txt",
];

/// One `digest name` line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name as written (without `./` or a binary-mode `*`).
    pub name: String,
    /// Digest algorithm implied by the digest length or BSD tag.
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
}

/// A parsed checksums manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    /// Well-formed entries in file order.
    pub entries: Vec<ManifestEntry>,
    /// 1-based numbers of lines that could not be parsed.
    pub malformed_lines: Vec<usize>,
}

impl ChecksumManifest {
    /// Parse GNU and BSD style manifest text.
    ///
    /// A bare digest line (as written to `<artifact>.sha256`) is attributed
    /// to `default_name` when one is given.
    pub fn parse(text: &str, default_name: Option<&str>) -> Self {
        let mut manifest = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line, default_name) {
                Some(entry) => manifest.entries.push(entry),
                None => manifest.malformed_lines.push(idx + 1),
            }
        }
        manifest
    }

    /// Entries whose file name matches `name`.
    pub fn entries_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ManifestEntry> {
        self.entries.iter().filter(move |e| basename(&e.name) == name)
    }

    /// File names listed more than once.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut dups = std::collections::BTreeSet::new();
        for entry in &self.entries {
            let name = basename(&entry.name);
            if !seen.insert(name) {
                dups.insert(name.to_string());
            }
        }
        dups.into_iter().collect()
    }
}

fn basename(name: &str) -> &str {
    let name = name.trim_start_matches("./");
    name.rsplit('/').next().unwrap_or(name)
}

fn parse_line(line: &str, default_name: Option<&str>) -> Option<ManifestEntry> {
    // BSD: SHA256 (name) = hex
    let bsd = line
        .split_once(" (")
        .and_then(|(tag, rest)| Some((tag.parse::<DigestAlgorithm>().ok()?, rest)));
    if let Some((algorithm, rest)) = bsd {
        let (name, digest) = rest.rsplit_once(") = ")?;
        let (by_len, digest) = normalize_hex(digest).ok()?;
        return (by_len == algorithm).then(|| ManifestEntry {
            name: name.to_string(),
            algorithm,
            digest,
        });
    }

    // GNU: hex  name | hex *name
    let mut parts = line.splitn(2, char::is_whitespace);
    let digest = parts.next()?;
    let name = parts
        .next()
        .map(|rest| rest.trim_start().trim_start_matches('*'))
        .filter(|rest| !rest.is_empty())
        .or(default_name)?;
    let (algorithm, digest) = normalize_hex(digest).ok()?;
    Some(ManifestEntry {
        name: name.to_string(),
        algorithm,
        digest,
    })
}

/// The manifest entry covering one artifact.
#[derive(Debug, Clone)]
pub struct ChecksumEvidence {
    /// Manifest file the entry came from.
    pub manifest_name: String,
    /// Matching entry.
    pub entry: ManifestEntry,
    /// The whole parsed manifest.
    pub manifest: ChecksumManifest,
}

/// Locates the checksum entry for an artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumFetcher;

#[async_trait]
impl EvidenceFetcher for ChecksumFetcher {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Checksum
    }

    async fn fetch(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        let mut candidates: Vec<String> = MANIFEST_NAMES.iter().map(|s| s.to_string()).collect();
        candidates.push(format!("{}.sha256", artifact.name));
        candidates.push(format!("{}.sha512", artifact.name));

        let mut consulted = Vec::new();
        for name in candidates {
            let Some(bytes) = source.fetch(&name).await? else {
                continue;
            };
            let per_file = !MANIFEST_NAMES.contains(&name.as_str());
            let text = String::from_utf8_lossy(&bytes);
            let manifest =
                ChecksumManifest::parse(&text, per_file.then_some(artifact.name.as_str()));
            consulted.push(name.clone());

            let found = manifest.entries_for(&artifact.name).next().cloned();
            if let Some(entry) = found {
                debug!(
                    artifact = %artifact.name,
                    manifest = %name,
                    algorithm = %entry.algorithm,
                    "Found checksum entry"
                );
                return Ok(Fetched::Found(Evidence::Checksum(ChecksumEvidence {
                    manifest_name: name,
                    entry,
                    manifest,
                })));
            }
        }

        Ok(Fetched::Missing(if consulted.is_empty() {
            "no checksum manifest published".to_string()
        } else {
            format!("{} not listed in {}", artifact.name, consulted.join(", "))
        }))
    }
}
