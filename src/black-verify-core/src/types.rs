//! Core data model: artifacts, severities, check results and verdicts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Where an artifact's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    /// File on the local filesystem.
    Local {
        /// Absolute or working-directory relative path.
        path: PathBuf,
    },
    /// Release asset download URL.
    Remote {
        /// Download URL.
        url: String,
    },
}

/// A release artifact to verify. Immutable once located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name.
    pub name: String,
    /// Declared version (release tag without a leading `v`).
    pub version: Option<String>,
    /// Content reference.
    pub content: ContentRef,
    /// Byte length reported when the artifact was located.
    pub size: u64,
    /// Content hash declared by the release API (`sha256:<hex>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_digest: Option<String>,
}

/// Archive and package suffixes stripped to get an artifact's stem.
const ARTIFACT_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tar.xz", ".tar.bz2", ".tar.zst", ".tgz", ".zip", ".pyz", ".whl", ".jar",
    ".exe", ".msi", ".dmg", ".pkg", ".deb", ".rpm", ".apk", ".AppImage", ".gz", ".xz", ".zst",
];

/// Pre-release markers that belong to the preceding version segment.
const PRERELEASE_MARKERS: &[&str] = &["rc", "alpha", "beta", "pre", "dev"];

impl Artifact {
    /// Artifact name without archive/package suffixes.
    ///
    /// Dots inside version numbers are kept (`demo-1.0.0` stays as is).
    pub fn stem(&self) -> &str {
        ARTIFACT_SUFFIXES
            .iter()
            .find_map(|suffix| self.name.strip_suffix(suffix))
            .unwrap_or(&self.name)
    }

    /// Version embedded in the file name, e.g. `1.0.0` for `demo-1.0.0.tar.gz`.
    pub fn embedded_version(&self) -> Option<String> {
        version_from_filename(self.stem())
    }
}

/// Extract the version segment from a file stem.
pub fn version_from_filename(stem: &str) -> Option<String> {
    let segments: Vec<&str> = stem.split(['-', '_']).collect();
    let idx = segments.iter().position(|segment| {
        let s = segment.strip_prefix('v').unwrap_or(segment);
        s.starts_with(|c: char| c.is_ascii_digit())
            && s.contains('.')
            && s.split('.').all(|part| !part.is_empty())
    })?;

    let first = segments[idx];
    let mut version = first.strip_prefix('v').unwrap_or(first).to_string();
    if let Some(next) = segments.get(idx + 1) {
        if PRERELEASE_MARKERS.iter().any(|m| next.starts_with(m)) {
            version.push('-');
            version.push_str(next);
        }
    }
    Some(version)
}

/// Severity of a check, carried by every report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Low impact.
    Low,
    /// Medium impact.
    Medium,
    /// High impact.
    High,
    /// Critical impact.
    Critical,
}

impl Severity {
    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Map a CVSS base score onto a severity band.
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::Info
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "none" | "informational" => Ok(Self::Info),
            "low" => Ok(Self::Low),
            "medium" | "moderate" => Ok(Self::Medium),
            "high" | "important" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(VerifyError::configuration(format!(
                "unknown severity '{other}' (expected info, low, medium, high or critical)"
            ))),
        }
    }
}

/// Outcome of one check against one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason", rename_all = "lowercase")]
pub enum CheckResult {
    /// Evidence present and valid.
    Pass,
    /// Non-blocking concern.
    Warn(String),
    /// Evidence present and invalid.
    Fail(String),
    /// Required evidence absent or errored.
    Skip(String),
}

impl CheckResult {
    /// Create a warning.
    pub fn warn(reason: impl Into<String>) -> Self {
        Self::Warn(reason.into())
    }

    /// Create a failure.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }

    /// Create a skip.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    /// Uppercase label used by the text reporter.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn(_) => "WARN",
            Self::Fail(_) => "FAIL",
            Self::Skip(_) => "SKIP",
        }
    }

    /// Reason attached to a non-pass result.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Warn(r) | Self::Fail(r) | Self::Skip(r) => Some(r),
        }
    }

    /// Whether this is a failure.
    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    /// Whether this is a skip.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    /// Whether this is a warning.
    pub fn is_warn(&self) -> bool {
        matches!(self, Self::Warn(_))
    }
}

impl From<VerifyError> for CheckResult {
    fn from(error: VerifyError) -> Self {
        match error {
            VerifyError::CheckFailure { reason } => Self::Fail(reason),
            other => Self::Fail(other.to_string()),
        }
    }
}

impl From<Result<(), VerifyError>> for CheckResult {
    fn from(result: Result<(), VerifyError>) -> Self {
        result.map_or_else(Self::from, |()| Self::Pass)
    }
}

/// Overall verdict for an artifact or a run. Ordered by badness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Every check passed (or skipped without policy impact).
    Pass,
    /// Non-blocking concerns.
    Warn,
    /// At least one check failed.
    Fail,
}

impl Verdict {
    /// Uppercase label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Kinds of evidence a check may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// The artifact bytes.
    Content,
    /// Checksums manifest entry.
    Checksum,
    /// Signature bundle.
    Signature,
    /// In-toto attestation.
    Attestation,
    /// Software bill of materials.
    Sbom,
    /// Vulnerability scan report.
    Vulnerability,
}

impl EvidenceKind {
    /// All kinds in fetch order.
    pub const ALL: [EvidenceKind; 6] = [
        Self::Content,
        Self::Checksum,
        Self::Signature,
        Self::Attestation,
        Self::Sbom,
        Self::Vulnerability,
    ];

    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Checksum => "checksum",
            Self::Signature => "signature",
            Self::Attestation => "attestation",
            Self::Sbom => "sbom",
            Self::Vulnerability => "vulnerability",
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
