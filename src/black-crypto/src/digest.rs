//! Content digests in the hex form used by checksum manifests.

use sha2::{Digest, Sha256, Sha512};

use crate::error::CryptoError;
use crate::types::DigestAlgorithm;

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Lowercase hex digest of `data` under `algorithm`.
#[must_use]
pub fn digest_hex(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
    }
}

/// Normalise a hex digest, stripping an optional `<alg>:` prefix.
///
/// # Errors
///
/// Returns error if the remainder is not valid hex of a known digest length.
pub fn normalize_hex(digest: &str) -> Result<(DigestAlgorithm, String), CryptoError> {
    let (prefix, hex_part) = match digest.split_once(':') {
        Some((alg, rest)) => (Some(alg), rest),
        None => (None, digest),
    };
    let hex_part = hex_part.trim().to_ascii_lowercase();

    if hex::decode(&hex_part).is_err() {
        return Err(CryptoError::invalid_digest(format!("not hex: {hex_part}")));
    }

    let by_len = DigestAlgorithm::from_hex_len(hex_part.len()).ok_or_else(|| {
        CryptoError::invalid_digest(format!("unexpected digest length {}", hex_part.len()))
    })?;

    if let Some(alg) = prefix {
        let named: DigestAlgorithm = alg.parse()?;
        if named != by_len {
            return Err(CryptoError::invalid_digest(format!(
                "{named} prefix on a {by_len} length digest"
            )));
        }
    }

    Ok((by_len, hex_part))
}

/// Compare two hex digests in constant time, ignoring case.
#[must_use]
pub fn digests_match(expected: &str, actual: &str) -> bool {
    match (hex::decode(expected.trim()), hex::decode(actual.trim())) {
        (Ok(a), Ok(b)) => crate::constant_time_eq(&a, &b),
        _ => false,
    }
}
