//! In-toto attestations wrapped in DSSE envelopes.
//!
//! Each line of `<artifact>.intoto.jsonl` is a DSSE envelope
//! (`payloadType`, base64 `payload`, `signatures`), a Sigstore bundle with
//! a `dsseEnvelope` member, or a bare statement. SLSA v0.2 and v1
//! provenance predicates are understood.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use black_crypto::{verify_signature, SignatureAlgorithm};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{fetch_first, Evidence, EvidenceFetcher, Fetched};
use crate::error::VerifyError;
use crate::source::AssetSource;
use crate::types::{Artifact, EvidenceKind};

/// A statement subject.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subject {
    /// Subject name, usually the artifact file name.
    pub name: String,
    /// Digests keyed by algorithm (`sha256`, ...).
    #[serde(default, rename = "digest")]
    pub digests: BTreeMap<String, String>,
}

/// A DSSE envelope as received, kept for signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Declared payload type.
    pub payload_type: String,
    /// Decoded payload bytes.
    pub payload: Vec<u8>,
    /// Decoded signatures. Entries that are not base64 are dropped.
    pub signatures: Vec<Vec<u8>>,
}

impl SignedEnvelope {
    /// DSSE pre-authentication encoding of the payload.
    pub fn pae(&self) -> Vec<u8> {
        pae(&self.payload_type, &self.payload)
    }

    /// Whether any signature verifies under `key`.
    pub fn verified_by(&self, algorithm: SignatureAlgorithm, key: &[u8]) -> bool {
        let message = self.pae();
        self.signatures
            .iter()
            .any(|sig| matches!(verify_signature(algorithm, key, &message, sig), Ok(true)))
    }
}

/// `DSSEv1 SP LEN(type) SP type SP LEN(body) SP body`.
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "DSSEv1 {} {payload_type} {} ",
        payload_type.len(),
        payload.len()
    )
    .into_bytes();
    out.extend_from_slice(payload);
    out
}

/// The parts of an in-toto statement the checks read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Predicate type URI.
    pub predicate_type: Option<String>,
    /// Subjects.
    pub subjects: Vec<Subject>,
    /// Builder id from the provenance predicate.
    pub builder_id: Option<String>,
    /// Build finish time from the provenance predicate.
    pub finished_on: Option<DateTime<Utc>>,
    /// Enclosing envelope; `None` for a bare statement.
    pub envelope: Option<SignedEnvelope>,
}

#[derive(Deserialize)]
struct RawStatement {
    #[serde(rename = "_type")]
    statement_type: String,
    #[serde(default, rename = "predicateType")]
    predicate_type: Option<String>,
    #[serde(default)]
    subject: Vec<Subject>,
    #[serde(default)]
    predicate: Value,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "payloadType")]
    payload_type: String,
    payload: String,
    #[serde(default)]
    signatures: Vec<RawSignature>,
}

#[derive(Deserialize)]
struct RawSignature {
    #[serde(default)]
    sig: String,
}

impl Statement {
    /// Parse one attestation line in any of the accepted shapes.
    pub fn parse_line(line: &str) -> Result<Self, VerifyError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| VerifyError::check_failure(format!("attestation is not JSON: {e}")))?;

        let value = match value.get("dsseEnvelope") {
            Some(envelope) => envelope.clone(),
            None => value,
        };

        if value.get("_type").is_some() {
            return Self::from_value(value);
        }

        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| VerifyError::check_failure(format!("not a DSSE envelope: {e}")))?;
        if !envelope.payload_type.contains("in-toto") {
            return Err(VerifyError::check_failure(format!(
                "unexpected DSSE payload type {}",
                envelope.payload_type
            )));
        }
        let payload = BASE64
            .decode(envelope.payload.trim())
            .map_err(|e| VerifyError::check_failure(format!("DSSE payload is not base64: {e}")))?;
        let value: Value = serde_json::from_slice(&payload)
            .map_err(|e| VerifyError::check_failure(format!("DSSE payload is not JSON: {e}")))?;
        let mut statement = Self::from_value(value)?;

        let signatures = envelope
            .signatures
            .iter()
            .filter_map(|s| BASE64.decode(s.sig.trim()).ok())
            .filter(|sig| !sig.is_empty())
            .collect();
        statement.envelope = Some(SignedEnvelope {
            payload_type: envelope.payload_type,
            payload,
            signatures,
        });
        Ok(statement)
    }

    fn from_value(value: Value) -> Result<Self, VerifyError> {
        let raw: RawStatement = serde_json::from_value(value)
            .map_err(|e| VerifyError::check_failure(format!("malformed in-toto statement: {e}")))?;
        if !raw.statement_type.contains("in-toto.io/Statement") {
            return Err(VerifyError::check_failure(format!(
                "unexpected statement type {}",
                raw.statement_type
            )));
        }

        let predicate = &raw.predicate;
        // SLSA v0.2 first, then v1 (`runDetails`).
        let builder_id = predicate
            .pointer("/builder/id")
            .or_else(|| predicate.pointer("/runDetails/builder/id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let finished_on = predicate
            .pointer("/metadata/buildFinishedOn")
            .or_else(|| predicate.pointer("/runDetails/metadata/finishedOn"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(Self {
            predicate_type: raw.predicate_type,
            subjects: raw.subject,
            builder_id,
            finished_on,
            envelope: None,
        })
    }

    /// Subjects whose name is `name`.
    pub fn subjects_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Subject> {
        self.subjects
            .iter()
            .filter(move |s| s.name.trim_start_matches("./") == name)
    }
}

/// Statements read from one attestation file.
#[derive(Debug, Clone)]
pub struct AttestationEvidence {
    /// File the statements came from.
    pub file: String,
    /// Parsed statements.
    pub statements: Vec<Statement>,
    /// Lines that did not parse, with reasons.
    pub errors: Vec<String>,
}

/// Reads `<artifact>.intoto.jsonl` or `<artifact>.intoto.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttestationFetcher;

#[async_trait]
impl EvidenceFetcher for AttestationFetcher {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Attestation
    }

    async fn fetch(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        let candidates = ["intoto.jsonl", "intoto.json"].map(|ext| format!("{}.{ext}", artifact.name));
        let Some((file, bytes)) = fetch_first(source, &candidates).await? else {
            return Ok(Fetched::Missing("no attestation published".into()));
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        // A pretty-printed `.intoto.json` holds a single document.
        let documents: Vec<&str> = if file.ends_with(".json") {
            vec![text.trim()]
        } else {
            text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
        };
        for (idx, doc) in documents.into_iter().enumerate() {
            match Statement::parse_line(doc) {
                Ok(statement) => statements.push(statement),
                Err(e) => errors.push(format!("entry {}: {e}", idx + 1)),
            }
        }

        debug!(
            artifact = %artifact.name,
            file = %file,
            statements = statements.len(),
            errors = errors.len(),
            "Read attestations"
        );
        Ok(Fetched::Found(Evidence::Attestation(AttestationEvidence {
            file,
            statements,
            errors,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_dsse_slsa_v1() {
        let statement = json!({
            "_type": "https://in-toto.io/Statement/v1",
            "predicateType": "https://slsa.dev/provenance/v1",
            "subject": [{"name": "demo-1.0.0", "digest": {"sha256": "ab"}}],
            "predicate": {
                "runDetails": {
                    "builder": {"id": "https://github.com/slsa-framework/slsa-github-generator/.github/workflows/generator_generic_slsa3.yml@refs/tags/v2.0.0"},
                    "metadata": {"finishedOn": "2026-01-02T03:04:05Z"}
                }
            }
        });
        let envelope = json!({
            "payloadType": "application/vnd.in-toto+json",
            "payload": BASE64.encode(statement.to_string()),
            "signatures": []
        });

        let parsed = Statement::parse_line(&envelope.to_string()).unwrap();
        assert_eq!(parsed.subjects_named("demo-1.0.0").count(), 1);
        assert!(parsed
            .builder_id
            .unwrap()
            .starts_with("https://github.com/slsa-framework/"));
        assert_eq!(
            parsed.finished_on.unwrap(),
            "2026-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap()
        );
        let envelope = parsed.envelope.unwrap();
        assert_eq!(envelope.payload, statement.to_string().into_bytes());
        assert!(envelope.signatures.is_empty());
    }

    #[test]
    fn test_envelope_signature_over_pae() {
        use black_crypto::{ArtifactSigner, Ed25519Signer};

        let signer = Ed25519Signer::random();
        let key = signer.public_key().unwrap();
        let statement = json!({
            "_type": "https://in-toto.io/Statement/v1",
            "subject": [{"name": "demo-1.0.0", "digest": {"sha256": "ab"}}],
            "predicate": {}
        })
        .to_string();
        let payload_type = "application/vnd.in-toto+json";
        let sig = signer.sign(&pae(payload_type, statement.as_bytes())).unwrap();

        let line = |sig: &[u8]| {
            json!({
                "payloadType": payload_type,
                "payload": BASE64.encode(&statement),
                "signatures": [{"keyid": "", "sig": BASE64.encode(sig)}]
            })
            .to_string()
        };

        let signed = Statement::parse_line(&line(&sig)).unwrap();
        assert!(signed
            .envelope
            .unwrap()
            .verified_by(SignatureAlgorithm::Ed25519, &key));

        let forged = Statement::parse_line(&line(b"not a signature")).unwrap();
        assert!(!forged
            .envelope
            .unwrap()
            .verified_by(SignatureAlgorithm::Ed25519, &key));
    }

    #[test]
    fn test_pae_layout() {
        assert_eq!(pae("t", b"ab"), b"DSSEv1 1 t 2 ab".to_vec());
    }

    #[test]
    fn test_parse_bare_v02_statement() {
        let statement = json!({
            "_type": "https://in-toto.io/Statement/v0.1",
            "subject": [{"name": "./demo", "digest": {"sha256": "ab"}}],
            "predicate": {
                "builder": {"id": "https://github.com/hollowsunhc/black/.github/workflows/release.yml"},
                "metadata": {"buildFinishedOn": "2026-01-02T03:04:05+00:00"}
            }
        });
        let parsed = Statement::parse_line(&statement.to_string()).unwrap();
        assert_eq!(parsed.subjects_named("demo").count(), 1);
        assert!(parsed.finished_on.is_some());
        assert!(parsed.envelope.is_none());
    }

    #[test]
    fn test_rejects_other_payloads() {
        assert!(Statement::parse_line("not json").is_err());
        let envelope = json!({"payloadType": "text/plain", "payload": "aGk="});
        assert!(Statement::parse_line(&envelope.to_string()).is_err());
    }
}
