//! Artifact metadata checks.

use super::{ids, Check, CheckContext};
use crate::types::{CheckResult, EvidenceKind, Severity};

/// The declared version agrees with the artifact.
#[derive(Debug, Clone, Copy)]
pub struct MetadataVersion;

impl Check for MetadataVersion {
    fn id(&self) -> &'static str {
        ids::METADATA_VERSION
    }

    fn name(&self) -> &'static str {
        "Version matches release"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Content]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let Some(declared) = ctx.artifact.version.as_deref().filter(|v| !v.is_empty()) else {
            return CheckResult::skip("no declared version");
        };

        if let Some(embedded) = ctx.artifact.embedded_version() {
            return if embedded == declared {
                CheckResult::Pass
            } else {
                CheckResult::fail(format!(
                    "file name carries version {embedded}, release declares {declared}"
                ))
            };
        }

        let Some(content) = ctx.bundle.content() else {
            return CheckResult::skip("artifact content unavailable");
        };
        let needle = declared.as_bytes();
        if content.bytes.windows(needle.len()).any(|w| w == needle) {
            CheckResult::Pass
        } else {
            CheckResult::warn(format!("version {declared} not found in artifact"))
        }
    }
}

/// The artifact size is plausible.
#[derive(Debug, Clone, Copy)]
pub struct MetadataSize;

impl Check for MetadataSize {
    fn id(&self) -> &'static str {
        ids::METADATA_SIZE
    }

    fn name(&self) -> &'static str {
        "Artifact size is plausible"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Content]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let Some(content) = ctx.bundle.content() else {
            return CheckResult::skip("artifact content unavailable");
        };
        let actual = content.len();
        let max = ctx.policy.max_artifact_size;

        if actual == 0 {
            CheckResult::fail("artifact is empty")
        } else if actual != ctx.artifact.size {
            CheckResult::fail(format!(
                "artifact is {actual} bytes but was listed as {} bytes",
                ctx.artifact.size
            ))
        } else if actual > max {
            CheckResult::fail(format!("artifact is {actual} bytes, above the {max} byte limit"))
        } else {
            CheckResult::Pass
        }
    }
}
