//! Signature bundle checks.

use black_crypto::verify_signature;

use super::{ids, matches_trusted, Check, CheckContext};
use crate::error::VerifyError;
use crate::evidence::{Certificate, SignatureBundle};
use crate::types::{CheckResult, EvidenceKind, Severity};

fn parsed_bundle<'a>(ctx: &'a CheckContext<'_>) -> Result<&'a SignatureBundle, CheckResult> {
    match ctx.bundle.signature() {
        Some(evidence) => evidence.bundle.as_ref().map_err(|reason| {
            CheckResult::fail(format!("{}: {reason}", evidence.file))
        }),
        None => Err(CheckResult::skip("signature evidence unavailable")),
    }
}

/// The signature verifies over the artifact bytes.
#[derive(Debug, Clone, Copy)]
pub struct SignatureValid;

impl Check for SignatureValid {
    fn id(&self) -> &'static str {
        ids::SIGNATURE_VALID
    }

    fn name(&self) -> &'static str {
        "Signature verifies"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Content, EvidenceKind::Signature]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let bundle = match parsed_bundle(ctx) {
            Ok(bundle) => bundle,
            Err(result) => return result,
        };
        let Some(content) = ctx.bundle.content() else {
            return CheckResult::skip("artifact content unavailable");
        };

        let verified = (|| -> Result<bool, VerifyError> {
            let (algorithm, key) = bundle.signing_key()?;
            let signature = bundle.signature_bytes()?;
            Ok(verify_signature(algorithm, &key, &content.bytes, &signature)?)
        })();

        match verified {
            Ok(true) => CheckResult::Pass,
            Ok(false) => CheckResult::fail(format!(
                "{} signature does not verify over the artifact",
                bundle.algorithm
            )),
            Err(e) => e.into(),
        }
    }
}

/// The signer identity is trusted.
#[derive(Debug, Clone, Copy)]
pub struct SignerIdentity;

impl Check for SignerIdentity {
    fn id(&self) -> &'static str {
        ids::SIGNATURE_IDENTITY
    }

    fn name(&self) -> &'static str {
        "Signer identity is trusted"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Signature]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let bundle = match parsed_bundle(ctx) {
            Ok(bundle) => bundle,
            Err(result) => return result,
        };
        let identity = &bundle.signer.identity;
        let trusted = &ctx.policy.trusted_identities;

        if trusted.is_empty() {
            return CheckResult::warn(format!(
                "no trusted identity configured; signed by {identity}"
            ));
        }
        if trusted.iter().any(|t| matches_trusted(identity, t)) {
            CheckResult::Pass
        } else {
            CheckResult::fail(format!("signer {identity} is not a trusted identity"))
        }
    }
}

/// The certificate chain is intact, current and anchored.
#[derive(Debug, Clone, Copy)]
pub struct CertificateChain;

impl CertificateChain {
    fn verify_links(chain: &[Certificate], ctx: &CheckContext<'_>) -> Result<(), VerifyError> {
        for (idx, cert) in chain.iter().enumerate() {
            if !cert.valid_at(ctx.now) {
                return Err(VerifyError::check_failure(format!(
                    "certificate '{}' is not valid now ({} to {})",
                    cert.subject,
                    cert.not_before.to_rfc3339(),
                    cert.not_after.to_rfc3339()
                )));
            }

            let issuer = chain.get(idx + 1).unwrap_or(cert);
            if cert.issuer != issuer.subject {
                return Err(VerifyError::check_failure(format!(
                    "certificate '{}' names issuer '{}' but is followed by '{}'",
                    cert.subject, cert.issuer, issuer.subject
                )));
            }
            let ok = verify_signature(
                issuer.algorithm,
                &issuer.public_key_bytes()?,
                &cert.tbs_bytes(),
                &cert.signature_bytes()?,
            )?;
            if !ok {
                return Err(VerifyError::check_failure(format!(
                    "certificate '{}' is not signed by '{}'",
                    cert.subject, issuer.subject
                )));
            }
        }
        Ok(())
    }
}

impl Check for CertificateChain {
    fn id(&self) -> &'static str {
        ids::SIGNATURE_CHAIN
    }

    fn name(&self) -> &'static str {
        "Certificate chain is valid"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Signature]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let bundle = match parsed_bundle(ctx) {
            Ok(bundle) => bundle,
            Err(result) => return result,
        };
        let chain = &bundle.certificate_chain;
        let Some(root) = chain.last() else {
            return CheckResult::warn("bundle has no certificate chain; signing key is unanchored");
        };

        if let Some(signed_at) = bundle.signed_at {
            let skew = chrono::Duration::from_std(ctx.policy.clock_skew)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if signed_at > ctx.now + skew {
                return CheckResult::fail(format!(
                    "bundle is signed in the future ({})",
                    signed_at.to_rfc3339()
                ));
            }
        }
        if let Err(e) = bundle.signing_key() {
            return e.into();
        }
        if let Err(e) = Self::verify_links(chain, ctx) {
            return e.into();
        }

        let fingerprint = match root.fingerprint() {
            Ok(fp) => fp,
            Err(e) => return e.into(),
        };
        let pinned = &ctx.policy.trusted_roots;
        if pinned.is_empty() {
            CheckResult::warn(format!("root '{}' ({fingerprint}) is not pinned", root.subject))
        } else if pinned.iter().any(|fp| fp == &fingerprint) {
            CheckResult::Pass
        } else {
            CheckResult::fail(format!(
                "root '{}' ({fingerprint}) is not a trusted root",
                root.subject
            ))
        }
    }
}
