//! # black-crypto
//!
//! Signature and digest primitives for release provenance verification.
//!
//! - **Signatures**: ECDSA P-256 (cosign default) and Ed25519
//! - **Digests**: SHA-256 and SHA-512 in checksum-manifest hex form
//!
//! Verifiers are selected by the algorithm a signature bundle declares:
//!
//! ```rust,ignore
//! let ok = black_crypto::verify_signature(SignatureAlgorithm::Ed25519, &pk, &data, &sig)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod digest;
mod error;
mod signing;
mod types;

#[cfg(feature = "ecdsa-p256")]
mod ecdsa;

#[cfg(feature = "ed25519")]
mod ed25519;

pub use digest::{digest_hex, digests_match, normalize_hex, sha256_hex};
pub use error::CryptoError;
pub use signing::{ArtifactSigner, SignatureVerifier};
pub use types::{DigestAlgorithm, SignatureAlgorithm};

#[cfg(feature = "ecdsa-p256")]
pub use ecdsa::{P256Signer, P256Verifier};

#[cfg(feature = "ed25519")]
pub use ed25519::{Ed25519Signer, Ed25519Verifier};

/// Get the verifier for `algorithm`.
///
/// # Errors
///
/// Returns [`CryptoError::AlgorithmDisabled`] if the algorithm's feature is
/// not compiled in.
pub fn verifier_for(
    algorithm: SignatureAlgorithm,
) -> Result<Box<dyn SignatureVerifier + Send + Sync>, CryptoError> {
    match algorithm {
        #[cfg(feature = "ecdsa-p256")]
        SignatureAlgorithm::EcdsaP256 => Ok(Box::new(P256Verifier::new())),
        #[cfg(feature = "ed25519")]
        SignatureAlgorithm::Ed25519 => Ok(Box::new(Ed25519Verifier::new())),
        #[allow(unreachable_patterns)]
        other => Err(CryptoError::AlgorithmDisabled { algorithm: other }),
    }
}

/// Verify `signature` over `data` with `public_key` under `algorithm`.
///
/// # Errors
///
/// Returns error if the key or signature cannot be decoded.
pub fn verify_signature(
    algorithm: SignatureAlgorithm,
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    verifier_for(algorithm)?.verify(public_key, data, signature)
}

/// Constant-time byte comparison.
///
/// The length check returns early; digest and key lengths are not secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
