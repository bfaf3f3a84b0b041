//! OIDC token hash claims.
//!
//! `at_hash` and `c_hash` are the base64url encoding of the left half of a
//! SHA-2 digest over the artifact's ASCII bytes, where the digest strength
//! matches the ID token's signing algorithm (OIDC Core Section 3.3.2.11).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::alg::SignatureAlgorithm;
use crate::error::JoseError;

/// Computes the left-half hash claim for an issued artifact (access token or
/// authorization code) relative to the ID token signing algorithm.
///
/// # Errors
///
/// Returns [`JoseError::UnsupportedAlgorithm`] for `alg=none`, which has no
/// associated digest.
pub fn half_hash(artifact: &str, id_token_alg: SignatureAlgorithm) -> Result<String, JoseError> {
    let digest: Vec<u8> = match id_token_alg.hash_bits() {
        256 => Sha256::digest(artifact.as_bytes()).to_vec(),
        384 => Sha384::digest(artifact.as_bytes()).to_vec(),
        512 => Sha512::digest(artifact.as_bytes()).to_vec(),
        _ => return Err(JoseError::unsupported(id_token_alg.as_str())),
    };
    Ok(URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_hash_is_stable() {
        let a = half_hash("SplxlOBeZQQYbYS6WxSbIA", SignatureAlgorithm::RS256).unwrap();
        let b = half_hash("SplxlOBeZQQYbYS6WxSbIA", SignatureAlgorithm::RS256).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_half_hash_lengths_track_algorithm() {
        // Left half of SHA-256 is 16 bytes -> 22 base64url chars.
        let h256 = half_hash("token", SignatureAlgorithm::RS256).unwrap();
        assert_eq!(h256.len(), 22);

        // Left half of SHA-384 is 24 bytes -> 32 base64url chars.
        let h384 = half_hash("token", SignatureAlgorithm::ES384).unwrap();
        assert_eq!(h384.len(), 32);

        // Left half of SHA-512 is 32 bytes -> 43 base64url chars.
        let h512 = half_hash("token", SignatureAlgorithm::PS512).unwrap();
        assert_eq!(h512.len(), 43);
    }

    #[test]
    fn test_known_vector() {
        // OIDC Core Section A.3 example: at_hash of "jHkWEdUXMU1BwAsC4vtUsZwnNvTIxEl0z9K3vx5KF0Y"
        // under RS256 is "77QmUPtjPfzWtF2AnpK9RQ".
        let hash = half_hash(
            "jHkWEdUXMU1BwAsC4vtUsZwnNvTIxEl0z9K3vx5KF0Y",
            SignatureAlgorithm::RS256,
        )
        .unwrap();
        assert_eq!(hash, "77QmUPtjPfzWtF2AnpK9RQ");
    }

    #[test]
    fn test_none_has_no_hash() {
        assert!(half_hash("token", SignatureAlgorithm::None).is_err());
    }

    #[test]
    fn test_distinct_artifacts_distinct_hashes() {
        let a = half_hash("artifact-a", SignatureAlgorithm::RS256).unwrap();
        let b = half_hash("artifact-b", SignatureAlgorithm::RS256).unwrap();
        assert_ne!(a, b);
    }
}
