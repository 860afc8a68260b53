//! Signer and verifier capabilities.
//!
//! Verification is all the release checks need; signers exist so fixtures
//! and release tooling can produce bundles with the same key types.

use crate::error::CryptoError;
use crate::types::SignatureAlgorithm;

/// Produces detached signatures over arbitrary bytes.
pub trait ArtifactSigner {
    /// Get the algorithm used by this signer.
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Get the encoded public key.
    fn public_key(&self) -> Result<Vec<u8>, CryptoError>;

    /// Sign data and return the signature.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Verifies detached signatures.
pub trait SignatureVerifier {
    /// Verify a signature against a public key.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify
    /// and `Err` when the key or signature cannot be decoded.
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8])
        -> Result<bool, CryptoError>;
}
