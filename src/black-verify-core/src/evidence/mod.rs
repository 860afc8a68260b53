//! Evidence fetchers and the per-artifact evidence bundle.
//!
//! Each [`EvidenceFetcher`] retrieves one [`EvidenceKind`] for one artifact
//! from an [`AssetSource`]. Fetchers are independent: a missing or broken
//! piece of evidence never prevents the others from being collected.
//!
//! ## Naming conventions
//!
//! | kind | files consulted |
//! |------|-----------------|
//! | checksum | `SHA256SUMS`, `SHA256SUMS.txt`, `sha256sums.txt`, `SHA512SUMS`, `SHA512SUMS.txt`, `checksums.txt`, `<artifact>.sha256`, `<artifact>.sha512` |
//! | signature | `<artifact>.sig.json`, `<artifact>.sig`, `<artifact>.bundle` |
//! | attestation | `<artifact>.intoto.jsonl`, `<artifact>.intoto.json` |
//! | sbom | `<artifact>.spdx.json`, `<artifact>.cdx.json`, `<artifact>.sbom.json` |
//! | vulnerability | `<artifact>.osv.json`, `<artifact>.vulns.json`, or `osv-scanner` |

pub mod attestation;
pub mod checksum;
pub mod content;
pub mod sbom;
pub mod signature;
pub mod vulnerability;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::source::AssetSource;
use crate::types::{Artifact, EvidenceKind};

pub use attestation::{pae, AttestationEvidence, AttestationFetcher, SignedEnvelope, Statement, Subject};
pub use checksum::{ChecksumEvidence, ChecksumFetcher, ChecksumManifest, ManifestEntry};
pub use content::{ArtifactContent, ContentFetcher};
pub use sbom::{SbomDocument, SbomEvidence, SbomFetcher, SbomFormat};
pub use signature::{Certificate, SignatureBundle, SignatureEvidence, SignatureFetcher, SignerInfo};
pub use vulnerability::{
    Finding, VulnerabilityEvidence, VulnerabilityFetcher, VulnerabilityReport,
};

/// Exact file names that are always evidence, never artifacts.
const EVIDENCE_NAMES: &[&str] = &[
    "SHA256SUMS",
    "SHA256SUMS.txt",
    "sha256sums.txt",
    "SHA512SUMS",
    "SHA512SUMS.txt",
    "checksums.txt",
];

/// Suffixes that mark a file as evidence.
const EVIDENCE_SUFFIXES: &[&str] = &[
    ".sha256",
    ".sha512",
    ".sig",
    ".sig.json",
    ".bundle",
    ".pem",
    ".crt",
    ".pub",
    ".asc",
    ".intoto.jsonl",
    ".intoto.json",
    ".sbom.json",
    ".spdx.json",
    ".cdx.json",
    ".osv.json",
    ".vulns.json",
];

/// Whether `name` is an evidence file rather than a release artifact.
pub fn is_evidence_file(name: &str) -> bool {
    EVIDENCE_NAMES.contains(&name)
        || EVIDENCE_NAMES
            .iter()
            .any(|manifest| name.strip_prefix(manifest).is_some_and(|rest| rest.starts_with('.')))
        || EVIDENCE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// One retrieved piece of evidence.
#[derive(Debug)]
pub enum Evidence {
    /// Artifact bytes.
    Content(ArtifactContent),
    /// Checksums manifest entry.
    Checksum(ChecksumEvidence),
    /// Signature bundle.
    Signature(SignatureEvidence),
    /// Attestation statements.
    Attestation(AttestationEvidence),
    /// SBOM document.
    Sbom(SbomEvidence),
    /// Vulnerability scan report.
    Vulnerability(VulnerabilityEvidence),
}

impl Evidence {
    /// The kind of this evidence.
    pub fn kind(&self) -> EvidenceKind {
        match self {
            Self::Content(_) => EvidenceKind::Content,
            Self::Checksum(_) => EvidenceKind::Checksum,
            Self::Signature(_) => EvidenceKind::Signature,
            Self::Attestation(_) => EvidenceKind::Attestation,
            Self::Sbom(_) => EvidenceKind::Sbom,
            Self::Vulnerability(_) => EvidenceKind::Vulnerability,
        }
    }
}

/// State of one evidence kind for one artifact.
#[derive(Debug)]
pub enum EvidenceSlot {
    /// Retrieved (possibly malformed; checks decide).
    Present(Evidence),
    /// Not published.
    Absent(String),
    /// Retrieval failed or timed out.
    Errored(String),
}

/// Result of a successful fetch.
#[derive(Debug)]
pub enum Fetched {
    /// Evidence was found.
    Found(Evidence),
    /// Evidence is not published; the reason is shown on skipped checks.
    Missing(String),
}

/// Retrieves one kind of evidence for one artifact.
#[async_trait]
pub trait EvidenceFetcher: Send + Sync {
    /// Kind this fetcher produces.
    fn kind(&self) -> EvidenceKind;

    /// Fetch the evidence.
    ///
    /// Absence is `Ok(Fetched::Missing)`; only transport and tool failures
    /// are errors.
    async fn fetch(&self, artifact: &Artifact, source: &dyn AssetSource)
        -> Result<Fetched, VerifyError>;
}

/// The standard fetcher set, one per evidence kind.
pub fn default_fetchers(config: &VerifyConfig) -> Vec<Arc<dyn EvidenceFetcher>> {
    vec![
        Arc::new(ContentFetcher),
        Arc::new(ChecksumFetcher),
        Arc::new(SignatureFetcher),
        Arc::new(AttestationFetcher),
        Arc::new(SbomFetcher),
        Arc::new(VulnerabilityFetcher::new(config.osv_scanner)),
    ]
}

/// Try `candidates` in order and return the first asset that exists.
pub(crate) async fn fetch_first(
    source: &dyn AssetSource,
    candidates: &[String],
) -> Result<Option<(String, Vec<u8>)>, VerifyError> {
    for name in candidates {
        if let Some(bytes) = source.fetch(name).await? {
            return Ok(Some((name.clone(), bytes)));
        }
    }
    Ok(None)
}

/// Per-artifact evidence, one slot per collected kind.
#[derive(Debug, Default)]
pub struct EvidenceBundle {
    slots: BTreeMap<EvidenceKind, EvidenceSlot>,
}

impl EvidenceBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the slot for `kind`.
    pub fn insert(&mut self, kind: EvidenceKind, slot: EvidenceSlot) {
        self.slots.insert(kind, slot);
    }

    /// Record present evidence under its own kind.
    pub fn with(mut self, evidence: Evidence) -> Self {
        self.slots.insert(evidence.kind(), EvidenceSlot::Present(evidence));
        self
    }

    /// Get the slot for `kind`, if collected.
    pub fn slot(&self, kind: EvidenceKind) -> Option<&EvidenceSlot> {
        self.slots.get(&kind)
    }

    /// Why `kind` cannot be used, or `None` if it is present.
    pub fn missing_reason(&self, kind: EvidenceKind) -> Option<String> {
        match self.slots.get(&kind) {
            Some(EvidenceSlot::Present(_)) => None,
            Some(EvidenceSlot::Absent(reason)) => Some(reason.clone()),
            Some(EvidenceSlot::Errored(reason)) => {
                Some(format!("{kind} retrieval failed: {reason}"))
            },
            None => Some(format!("{kind} evidence was not collected")),
        }
    }

    fn present(&self, kind: EvidenceKind) -> Option<&Evidence> {
        match self.slots.get(&kind) {
            Some(EvidenceSlot::Present(evidence)) => Some(evidence),
            _ => None,
        }
    }

    /// Artifact bytes.
    pub fn content(&self) -> Option<&ArtifactContent> {
        match self.present(EvidenceKind::Content) {
            Some(Evidence::Content(c)) => Some(c),
            _ => None,
        }
    }

    /// Checksum evidence.
    pub fn checksum(&self) -> Option<&ChecksumEvidence> {
        match self.present(EvidenceKind::Checksum) {
            Some(Evidence::Checksum(c)) => Some(c),
            _ => None,
        }
    }

    /// Signature evidence.
    pub fn signature(&self) -> Option<&SignatureEvidence> {
        match self.present(EvidenceKind::Signature) {
            Some(Evidence::Signature(s)) => Some(s),
            _ => None,
        }
    }

    /// Attestation evidence.
    pub fn attestation(&self) -> Option<&AttestationEvidence> {
        match self.present(EvidenceKind::Attestation) {
            Some(Evidence::Attestation(a)) => Some(a),
            _ => None,
        }
    }

    /// SBOM evidence.
    pub fn sbom(&self) -> Option<&SbomEvidence> {
        match self.present(EvidenceKind::Sbom) {
            Some(Evidence::Sbom(s)) => Some(s),
            _ => None,
        }
    }

    /// Vulnerability evidence.
    pub fn vulnerability(&self) -> Option<&VulnerabilityEvidence> {
        match self.present(EvidenceKind::Vulnerability) {
            Some(Evidence::Vulnerability(v)) => Some(v),
            _ => None,
        }
    }
}
