//! Detached signature bundles.
//!
//! A bundle is a JSON document published next to the artifact:
//!
//! ```json
//! {
//!   "algorithm": "ed25519",
//!   "signature": "<base64>",
//!   "public_key": "<base64, optional>",
//!   "signed_at": "2026-01-01T00:00:00Z",
//!   "signer": { "identity": "https://github.com/owner/repo/...", "issuer": "..." },
//!   "certificate_chain": [ { "subject": "...", "issuer": "...", ... } ]
//! }
//! ```
//!
//! The chain runs leaf first. Each certificate's `signature` covers
//! [`Certificate::tbs_bytes`] and is made with the next certificate's key;
//! the last certificate signs itself.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use black_crypto::{sha256_hex, SignatureAlgorithm};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{fetch_first, Evidence, EvidenceFetcher, Fetched};
use crate::error::VerifyError;
use crate::source::AssetSource;
use crate::types::{Artifact, EvidenceKind};

/// Who signed the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Signer identity (workflow URL, e-mail, key id).
    pub identity: String,
    /// Identity issuer, e.g. an OIDC provider.
    #[serde(default)]
    pub issuer: Option<String>,
}

/// One certificate of a bundle's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Subject name.
    pub subject: String,
    /// Issuer name.
    pub issuer: String,
    /// Base64 public key of the subject.
    pub public_key: String,
    /// Algorithm of `public_key`.
    pub algorithm: SignatureAlgorithm,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
    /// Base64 signature over [`Certificate::tbs_bytes`] by the issuer's key.
    pub signature: String,
}

#[derive(Serialize)]
struct TbsCertificate<'a> {
    subject: &'a str,
    issuer: &'a str,
    public_key: &'a str,
    algorithm: SignatureAlgorithm,
    not_before: &'a DateTime<Utc>,
    not_after: &'a DateTime<Utc>,
}

impl Certificate {
    /// The signed portion: every field except `signature`, as compact JSON
    /// in declaration order.
    pub fn tbs_bytes(&self) -> Vec<u8> {
        let tbs = TbsCertificate {
            subject: &self.subject,
            issuer: &self.issuer,
            public_key: &self.public_key,
            algorithm: self.algorithm,
            not_before: &self.not_before,
            not_after: &self.not_after,
        };
        // Serializing plain strings and timestamps cannot fail.
        serde_json::to_vec(&tbs).unwrap_or_default()
    }

    /// Decoded public key.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, VerifyError> {
        decode_b64(&self.public_key, "certificate public key")
    }

    /// Decoded signature.
    pub fn signature_bytes(&self) -> Result<Vec<u8>, VerifyError> {
        decode_b64(&self.signature, "certificate signature")
    }

    /// SHA-256 fingerprint (hex) of the decoded public key.
    pub fn fingerprint(&self) -> Result<String, VerifyError> {
        Ok(sha256_hex(&self.public_key_bytes()?))
    }

    /// Whether `at` lies inside the validity window.
    pub fn valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// A parsed signature bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBundle {
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Base64 signature over the artifact bytes.
    pub signature: String,
    /// Base64 signing key; must equal the leaf key when a chain is present.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Signing time.
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    /// Signer identity.
    pub signer: SignerInfo,
    /// Certificate chain, leaf first.
    #[serde(default)]
    pub certificate_chain: Vec<Certificate>,
}

impl SignatureBundle {
    /// Parse bundle JSON.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerifyError> {
        serde_json::from_slice(bytes)
            .map_err(|e| VerifyError::check_failure(format!("malformed signature bundle: {e}")))
    }

    /// Decoded signature.
    pub fn signature_bytes(&self) -> Result<Vec<u8>, VerifyError> {
        decode_b64(&self.signature, "signature")
    }

    /// The key that made the signature: the leaf's, else `public_key`.
    ///
    /// Fails when both are present and disagree.
    pub fn signing_key(&self) -> Result<(SignatureAlgorithm, Vec<u8>), VerifyError> {
        let explicit = self
            .public_key
            .as_deref()
            .map(|k| decode_b64(k, "public key"))
            .transpose()?;
        match (self.certificate_chain.first(), explicit) {
            (Some(leaf), explicit) => {
                let leaf_key = leaf.public_key_bytes()?;
                if explicit.is_some_and(|k| k != leaf_key) {
                    return Err(VerifyError::check_failure(
                        "bundle public key does not match the leaf certificate",
                    ));
                }
                if leaf.algorithm != self.algorithm {
                    return Err(VerifyError::check_failure(format!(
                        "leaf certificate is {} but the signature is {}",
                        leaf.algorithm, self.algorithm
                    )));
                }
                Ok((leaf.algorithm, leaf_key))
            },
            (None, Some(key)) => Ok((self.algorithm, key)),
            (None, None) => Err(VerifyError::check_failure(
                "bundle carries neither a public key nor a certificate chain",
            )),
        }
    }
}

fn decode_b64(value: &str, what: &str) -> Result<Vec<u8>, VerifyError> {
    BASE64
        .decode(value.trim())
        .map_err(|e| VerifyError::check_failure(format!("{what} is not valid base64: {e}")))
}

/// A retrieved bundle. Parse errors are kept so checks can fail on them.
#[derive(Debug, Clone)]
pub struct SignatureEvidence {
    /// File the bundle was read from.
    pub file: String,
    /// Parsed bundle, or why it could not be parsed.
    pub bundle: Result<SignatureBundle, String>,
}

/// Reads `<artifact>.sig.json`, `<artifact>.sig` or `<artifact>.bundle`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureFetcher;

#[async_trait]
impl EvidenceFetcher for SignatureFetcher {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Signature
    }

    async fn fetch(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        let candidates = ["sig.json", "sig", "bundle"].map(|ext| format!("{}.{ext}", artifact.name));
        let Some((file, bytes)) = fetch_first(source, &candidates).await? else {
            return Ok(Fetched::Missing("no signature bundle published".into()));
        };

        let bundle = SignatureBundle::parse(&bytes).map_err(|e| match e {
            VerifyError::CheckFailure { reason } => reason,
            other => other.to_string(),
        });
        debug!(artifact = %artifact.name, file = %file, parsed = bundle.is_ok(), "Read signature bundle");
        Ok(Fetched::Found(Evidence::Signature(SignatureEvidence { file, bundle })))
    }
}
