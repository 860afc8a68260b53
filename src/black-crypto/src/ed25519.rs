//! Ed25519 signature operations.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

use crate::error::CryptoError;
use crate::signing::{ArtifactSigner, SignatureVerifier};
use crate::types::SignatureAlgorithm;

/// Ed25519 signer.
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Create a new signer with a random key.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create a signer from seed bytes (32 bytes).
    ///
    /// # Errors
    ///
    /// Returns error if the seed is not exactly 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed_array: [u8; 32] = seed.try_into().map_err(|_| {
            CryptoError::invalid_private_key(format!(
                "Ed25519 seed must be 32 bytes, got {}",
                seed.len()
            ))
        })?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed_array),
        })
    }
}

impl ArtifactSigner for Ed25519Signer {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.signing_key.verifying_key().to_bytes().to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.signing_key.sign(data).to_bytes().to_vec())
    }
}

/// Ed25519 verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl Ed25519Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let pk_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
            CryptoError::invalid_public_key(format!(
                "Ed25519 public key must be 32 bytes, got {}",
                public_key.len()
            ))
        })?;

        let vk = VerifyingKey::from_bytes(&pk_bytes)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

        let sig_bytes: [u8; 64] = signature.try_into().map_err(|_| {
            CryptoError::invalid_signature(format!(
                "Ed25519 signature must be 64 bytes, got {}",
                signature.len()
            ))
        })?;

        let sig = Signature::from_bytes(&sig_bytes);
        Ok(vk.verify(data, &sig).is_ok())
    }
}
