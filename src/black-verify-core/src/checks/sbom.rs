//! SBOM checks.

use super::{ids, Check, CheckContext};
use crate::evidence::SbomDocument;
use crate::types::{CheckResult, EvidenceKind, Severity};

fn document<'a>(ctx: &'a CheckContext<'_>) -> Result<&'a SbomDocument, CheckResult> {
    match ctx.bundle.sbom() {
        Some(evidence) => evidence
            .document
            .as_ref()
            .map_err(|reason| CheckResult::fail(format!("{}: {reason}", evidence.file))),
        None => Err(CheckResult::skip("SBOM evidence unavailable")),
    }
}

/// Whether an SBOM component name refers to the artifact.
fn names_artifact(component: &str, name: &str, stem: &str) -> bool {
    let component = component.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    let stem = stem.to_ascii_lowercase();
    component == name
        || component == stem
        || stem
            .strip_prefix(&component)
            .is_some_and(|rest| rest.starts_with(['-', '_']))
}

/// An SBOM is published and well formed.
#[derive(Debug, Clone, Copy)]
pub struct SbomPresent;

impl Check for SbomPresent {
    fn id(&self) -> &'static str {
        ids::SBOM_PRESENT
    }

    fn name(&self) -> &'static str {
        "SBOM is present"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Sbom]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        match document(ctx) {
            Ok(_) => CheckResult::Pass,
            Err(result) => result,
        }
    }
}

/// The SBOM describes this artifact.
#[derive(Debug, Clone, Copy)]
pub struct SbomSubject;

impl Check for SbomSubject {
    fn id(&self) -> &'static str {
        ids::SBOM_SUBJECT
    }

    fn name(&self) -> &'static str {
        "SBOM describes artifact"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Sbom]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let doc = match document(ctx) {
            Ok(doc) => doc,
            Err(result) => return result,
        };
        let Some(component) = doc.subject_name.as_deref() else {
            return CheckResult::fail(format!("{} SBOM describes no component", doc.format));
        };

        let artifact = ctx.artifact;
        if !names_artifact(component, &artifact.name, artifact.stem()) {
            return CheckResult::fail(format!(
                "SBOM describes '{component}', not {}",
                artifact.name
            ));
        }

        let ours = artifact.version.clone().or_else(|| artifact.embedded_version());
        if let (Some(theirs), Some(ours)) = (doc.subject_version.as_deref(), ours) {
            let theirs = theirs.strip_prefix('v').unwrap_or(theirs);
            if theirs != ours {
                return CheckResult::fail(format!(
                    "SBOM describes version {theirs}, artifact is {ours}"
                ));
            }
        }
        CheckResult::Pass
    }
}
