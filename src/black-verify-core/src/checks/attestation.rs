//! Provenance attestation checks.

use super::{freshness, ids, Check, CheckContext};
use crate::evidence::Statement;
use crate::types::{CheckResult, EvidenceKind, Severity};

/// Statements about the artifact, or every statement when none names it.
fn relevant<'a>(statements: &[&'a Statement], name: &str) -> Vec<&'a Statement> {
    let named: Vec<&Statement> = statements
        .iter()
        .copied()
        .filter(|s| s.subjects_named(name).next().is_some())
        .collect();
    if named.is_empty() {
        statements.to_vec()
    } else {
        named
    }
}

/// Statements the checks may rely on.
struct Authenticated<'a> {
    statements: Vec<&'a Statement>,
    /// Why envelope signatures were not checked.
    unverified: Option<String>,
}

/// Keep only statements whose DSSE envelope is signed by the release
/// signing key. Without a usable key every statement is kept, marked
/// unverified.
fn authenticated<'a>(ctx: &'a CheckContext<'_>) -> Result<Authenticated<'a>, CheckResult> {
    let evidence = match ctx.bundle.attestation() {
        Some(evidence) if evidence.statements.is_empty() => {
            return Err(CheckResult::fail(format!(
                "{} holds no readable statements: {}",
                evidence.file,
                evidence.errors.join("; ")
            )))
        },
        Some(evidence) => evidence,
        None => return Err(CheckResult::skip("attestation evidence unavailable")),
    };

    let key = match ctx.bundle.signature() {
        Some(signature) => match &signature.bundle {
            Ok(bundle) => bundle.signing_key().map_err(|e| e.to_string()),
            Err(reason) => Err(format!("{}: {reason}", signature.file)),
        },
        None => Err("no signature bundle supplies a signing key".to_string()),
    };

    match key {
        Ok((algorithm, key)) => {
            let statements: Vec<&Statement> = evidence
                .statements
                .iter()
                .filter(|s| {
                    s.envelope
                        .as_ref()
                        .is_some_and(|e| e.verified_by(algorithm, &key))
                })
                .collect();
            if statements.is_empty() {
                return Err(CheckResult::fail(format!(
                    "no statement in {} is signed by the release signing key",
                    evidence.file
                )));
            }
            Ok(Authenticated {
                statements,
                unverified: None,
            })
        },
        Err(why) => Ok(Authenticated {
            statements: evidence.statements.iter().collect(),
            unverified: Some(format!("attestation signature not checked: {why}")),
        }),
    }
}

/// An attestation subject names the artifact with its digest.
#[derive(Debug, Clone, Copy)]
pub struct AttestationSubject;

impl Check for AttestationSubject {
    fn id(&self) -> &'static str {
        ids::ATTESTATION_SUBJECT
    }

    fn name(&self) -> &'static str {
        "Attestation covers artifact"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Content, EvidenceKind::Attestation]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let auth = match authenticated(ctx) {
            Ok(auth) => auth,
            Err(result) => return result,
        };
        let Some(content) = ctx.bundle.content() else {
            return CheckResult::skip("artifact content unavailable");
        };
        let name = &ctx.artifact.name;

        let subjects: Vec<_> = auth
            .statements
            .iter()
            .flat_map(|s| s.subjects_named(name))
            .collect();
        if subjects.is_empty() {
            return CheckResult::fail(format!("no attestation subject names {name}"));
        }

        let matched = subjects.iter().any(|s| {
            s.digests
                .get("sha256")
                .is_some_and(|d| black_crypto::digests_match(d, &content.sha256))
        });
        if matched {
            CheckResult::Pass
        } else {
            let attested: Vec<&str> = subjects
                .iter()
                .filter_map(|s| s.digests.get("sha256").map(String::as_str))
                .collect();
            CheckResult::fail(format!(
                "attested sha256 [{}] does not match artifact {}",
                attested.join(", "),
                content.sha256
            ))
        }
    }
}

/// The attestation was produced by a trusted builder.
#[derive(Debug, Clone, Copy)]
pub struct AttestationBuilder;

impl Check for AttestationBuilder {
    fn id(&self) -> &'static str {
        ids::ATTESTATION_BUILDER
    }

    fn name(&self) -> &'static str {
        "Attestation builder is trusted"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Attestation]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let auth = match authenticated(ctx) {
            Ok(auth) => auth,
            Err(result) => return result,
        };
        let builders: Vec<&str> = relevant(&auth.statements, &ctx.artifact.name)
            .into_iter()
            .filter_map(|s| s.builder_id.as_deref())
            .collect();
        if builders.is_empty() {
            return CheckResult::fail("attestation names no builder");
        }

        let trusted = &ctx.policy.trusted_builders;
        if trusted.is_empty() {
            return CheckResult::warn(format!(
                "no trusted builder configured; built by {}",
                builders.join(", ")
            ));
        }
        if !builders
            .iter()
            .any(|b| trusted.iter().any(|t| b.starts_with(t.as_str())))
        {
            return CheckResult::fail(format!("builder {} is not trusted", builders.join(", ")));
        }
        match auth.unverified {
            Some(why) => CheckResult::warn(format!("{why}; claims builder {}", builders.join(", "))),
            None => CheckResult::Pass,
        }
    }
}

/// The build finished recently.
#[derive(Debug, Clone, Copy)]
pub struct AttestationFreshness;

impl Check for AttestationFreshness {
    fn id(&self) -> &'static str {
        ids::ATTESTATION_FRESHNESS
    }

    fn name(&self) -> &'static str {
        "Attestation is fresh"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Attestation]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let auth = match authenticated(ctx) {
            Ok(auth) => auth,
            Err(result) => return result,
        };
        let finished = relevant(&auth.statements, &ctx.artifact.name)
            .into_iter()
            .filter_map(|s| s.finished_on)
            .max();
        freshness(
            "build",
            finished,
            ctx.now,
            ctx.policy.max_attestation_age,
            ctx.policy.clock_skew,
        )
    }
}
