//! ECDSA P-256 signature operations.
//!
//! Signatures are accepted either as fixed-width `r || s` (64 bytes) or as
//! ASN.1 DER, which is what cosign writes into `.sig` files.

use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use rand_core::OsRng;

use crate::error::CryptoError;
use crate::signing::{ArtifactSigner, SignatureVerifier};
use crate::types::SignatureAlgorithm;

/// ECDSA P-256 signer.
pub struct P256Signer {
    signing_key: SigningKey,
}

impl P256Signer {
    /// Create a new signer with a random key.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Create a signer from a 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns error if the key bytes are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }
}

impl ArtifactSigner for P256Signer {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::EcdsaP256
    }

    fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
        let encoded = self.signing_key.verifying_key().to_encoded_point(false);
        Ok(encoded.as_bytes().to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(signature.to_bytes().to_vec())
    }
}

/// ECDSA P-256 verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct P256Verifier;

impl P256Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for P256Verifier {
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let vk = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

        let sig = if signature.len() == 64 {
            Signature::from_slice(signature)
        } else {
            Signature::from_der(signature)
        }
        .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        Ok(vk.verify(data, &sig).is_ok())
    }
}
