//! The check registry.
//!
//! A [`CheckRegistry`] is an immutable, versioned, ordered table of
//! [`Check`]s. Each check declares the evidence kinds it needs; the engine
//! skips a check whose evidence is absent or errored and otherwise calls
//! its pure [`Check::evaluate`].

mod attestation;
mod digest;
mod metadata;
mod sbom;
mod signature;
mod vulnerability;

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::Policy;
use crate::error::VerifyError;
use crate::evidence::EvidenceBundle;
use crate::types::{Artifact, CheckResult, EvidenceKind, Severity};

pub use attestation::{AttestationBuilder, AttestationFreshness, AttestationSubject};
pub use digest::{DigestMatch, ManifestConsistent};
pub use metadata::{MetadataSize, MetadataVersion};
pub use sbom::{SbomPresent, SbomSubject};
pub use signature::{CertificateChain, SignatureValid, SignerIdentity};
pub use vulnerability::{VulnerabilityFreshness, VulnerabilityThreshold};

/// Version of the standard registry.
pub const REGISTRY_VERSION: &str = "2026.1";

/// Stable check identifiers.
pub mod ids {
    /// Artifact digest equals its manifest entry.
    pub const DIGEST_MATCH: &str = "digest.match";
    /// Manifest has no malformed or duplicate lines.
    pub const DIGEST_MANIFEST: &str = "digest.manifest-consistent";
    /// Signature verifies over the artifact bytes.
    pub const SIGNATURE_VALID: &str = "signature.valid";
    /// Signer identity is trusted.
    pub const SIGNATURE_IDENTITY: &str = "signature.identity";
    /// Certificate chain is intact and anchored.
    pub const SIGNATURE_CHAIN: &str = "signature.certificate-chain";
    /// An attestation subject names the artifact and its digest.
    pub const ATTESTATION_SUBJECT: &str = "attestation.subject";
    /// Attestation builder is trusted.
    pub const ATTESTATION_BUILDER: &str = "attestation.builder";
    /// Attestation build time is recent.
    pub const ATTESTATION_FRESHNESS: &str = "attestation.freshness";
    /// SBOM is present and well formed.
    pub const SBOM_PRESENT: &str = "sbom.present";
    /// SBOM describes the artifact.
    pub const SBOM_SUBJECT: &str = "sbom.subject";
    /// No finding at or above the severity threshold.
    pub const VULNERABILITY_THRESHOLD: &str = "vulnerability.threshold";
    /// Scan report is recent.
    pub const VULNERABILITY_FRESHNESS: &str = "vulnerability.freshness";
    /// Declared version agrees with the artifact.
    pub const METADATA_VERSION: &str = "metadata.version";
    /// Artifact size is plausible.
    pub const METADATA_SIZE: &str = "metadata.size";
}

/// Inputs to a check evaluation.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    /// The artifact under verification.
    pub artifact: &'a Artifact,
    /// Its collected evidence.
    pub bundle: &'a EvidenceBundle,
    /// Policy in force.
    pub policy: &'a Policy,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

/// A single verification check.
pub trait Check: Send + Sync {
    /// Stable identifier, e.g. `digest.match`.
    fn id(&self) -> &'static str;

    /// Short human-readable name.
    fn name(&self) -> &'static str;

    /// Severity carried by every result of this check.
    fn severity(&self) -> Severity;

    /// Evidence kinds this check reads.
    fn requires(&self) -> &'static [EvidenceKind];

    /// Evaluate against present evidence.
    ///
    /// Called only when every required kind is present.
    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult;
}

/// Run `check`, skipping it when its evidence is unavailable.
pub fn run_check(check: &dyn Check, ctx: &CheckContext<'_>) -> CheckResult {
    for kind in check.requires() {
        if let Some(reason) = ctx.bundle.missing_reason(*kind) {
            return CheckResult::Skip(reason);
        }
    }
    check.evaluate(ctx)
}

/// Immutable, ordered check table.
pub struct CheckRegistry {
    version: String,
    checks: Vec<Box<dyn Check>>,
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("version", &self.version)
            .field("checks", &self.checks.iter().map(|c| c.id()).collect::<Vec<_>>())
            .finish()
    }
}

impl CheckRegistry {
    /// The standard registry.
    pub fn standard() -> Self {
        Self {
            version: REGISTRY_VERSION.to_string(),
            checks: vec![
                Box::new(DigestMatch),
                Box::new(ManifestConsistent),
                Box::new(SignatureValid),
                Box::new(SignerIdentity),
                Box::new(CertificateChain),
                Box::new(AttestationSubject),
                Box::new(AttestationBuilder),
                Box::new(AttestationFreshness),
                Box::new(SbomPresent),
                Box::new(SbomSubject),
                Box::new(VulnerabilityThreshold),
                Box::new(VulnerabilityFreshness),
                Box::new(MetadataVersion),
                Box::new(MetadataSize),
            ],
        }
    }

    /// Build a custom registry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on duplicate ids or an empty table.
    pub fn from_checks(
        version: impl Into<String>,
        checks: Vec<Box<dyn Check>>,
    ) -> Result<Self, VerifyError> {
        if checks.is_empty() {
            return Err(VerifyError::configuration("registry has no checks"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = checks.iter().find(|c| !seen.insert(c.id())) {
            return Err(VerifyError::configuration(format!(
                "duplicate check id '{}'",
                dup.id()
            )));
        }
        Ok(Self {
            version: version.into(),
            checks,
        })
    }

    /// Registry version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Checks in evaluation order.
    pub fn checks(&self) -> &[Box<dyn Check>] {
        &self.checks
    }

    /// Whether a check with `id` exists.
    pub fn contains(&self, id: &str) -> bool {
        self.checks.iter().any(|c| c.id() == id)
    }

    /// Number of checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Union of the evidence kinds the checks need.
    pub fn required_kinds(&self) -> BTreeSet<EvidenceKind> {
        self.checks
            .iter()
            .flat_map(|c| c.requires().iter().copied())
            .collect()
    }
}

/// Judge a timestamp against a freshness window.
///
/// Missing timestamps warn; timestamps beyond the clock skew in the future,
/// or older than `max_age`, fail.
pub(crate) fn freshness(
    what: &str,
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age: Duration,
    skew: Duration,
) -> CheckResult {
    let Some(at) = timestamp else {
        return CheckResult::warn(format!("{what} carries no timestamp"));
    };
    let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
    if at > now + skew {
        return CheckResult::fail(format!("{what} is dated in the future ({})", at.to_rfc3339()));
    }
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    let age = now - at;
    if age > max_age {
        return CheckResult::fail(format!(
            "{what} is {} days old (limit {} days)",
            age.num_days(),
            max_age.num_days()
        ));
    }
    CheckResult::Pass
}

/// Whether `value` matches a trusted entry, exactly or as a prefix when the
/// entry ends in `/` or `@`.
pub(crate) fn matches_trusted(value: &str, trusted: &str) -> bool {
    if trusted.ends_with('/') || trusted.ends_with('@') {
        value.starts_with(trusted)
    } else {
        value == trusted
    }
}
