//! Content digest checks.

use black_crypto::{digest_hex, digests_match, normalize_hex};

use super::{ids, Check, CheckContext};
use crate::error::VerifyError;
use crate::types::{CheckResult, EvidenceKind, Severity};

/// The artifact's digest equals its manifest entry (and the API's declared hash).
#[derive(Debug, Clone, Copy)]
pub struct DigestMatch;

impl DigestMatch {
    fn verify(ctx: &CheckContext<'_>) -> Result<(), VerifyError> {
        let (Some(content), Some(checksum)) = (ctx.bundle.content(), ctx.bundle.checksum()) else {
            return Err(VerifyError::check_failure("digest evidence unavailable"));
        };

        let entry = &checksum.entry;
        let actual = digest_hex(entry.algorithm, &content.bytes);
        if !digests_match(&entry.digest, &actual) {
            return Err(VerifyError::check_failure(format!(
                "{} {} does not match {} entry {}",
                entry.algorithm, actual, checksum.manifest_name, entry.digest
            )));
        }

        if let Some(declared) = &ctx.artifact.declared_digest {
            let (algorithm, expected) = normalize_hex(declared).map_err(|e| {
                VerifyError::check_failure(format!("release API digest is malformed: {e}"))
            })?;
            let actual = digest_hex(algorithm, &content.bytes);
            if !digests_match(&expected, &actual) {
                return Err(VerifyError::check_failure(format!(
                    "release API declares {algorithm} {expected} but content is {actual}"
                )));
            }
        }
        Ok(())
    }
}

impl Check for DigestMatch {
    fn id(&self) -> &'static str {
        ids::DIGEST_MATCH
    }

    fn name(&self) -> &'static str {
        "Artifact digest matches manifest"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Content, EvidenceKind::Checksum]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        Self::verify(ctx).into()
    }
}

/// The manifest is well formed and lists each file once.
#[derive(Debug, Clone, Copy)]
pub struct ManifestConsistent;

impl Check for ManifestConsistent {
    fn id(&self) -> &'static str {
        ids::DIGEST_MANIFEST
    }

    fn name(&self) -> &'static str {
        "Checksum manifest is consistent"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Checksum]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let Some(checksum) = ctx.bundle.checksum() else {
            return CheckResult::skip("checksum evidence unavailable");
        };
        let manifest = &checksum.manifest;

        if !manifest.malformed_lines.is_empty() {
            let lines: Vec<String> = manifest.malformed_lines.iter().map(|n| n.to_string()).collect();
            return CheckResult::fail(format!(
                "{} has malformed lines: {}",
                checksum.manifest_name,
                lines.join(", ")
            ));
        }
        let duplicates = manifest.duplicate_names();
        if !duplicates.is_empty() {
            return CheckResult::fail(format!(
                "{} lists files more than once: {}",
                checksum.manifest_name,
                duplicates.join(", ")
            ));
        }
        CheckResult::Pass
    }
}
