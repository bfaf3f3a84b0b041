//! PKCE verification (RFC 7636).
//!
//! Only the `S256` challenge method is supported; `plain` is rejected.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Minimum code verifier length per RFC 7636.
const MIN_VERIFIER_LEN: usize = 43;
/// Maximum code verifier length per RFC 7636.
const MAX_VERIFIER_LEN: usize = 128;

/// Validates a challenge method parameter. Only `S256` passes.
///
/// # Errors
///
/// Returns `invalid_request` for `plain` or unknown methods.
pub fn validate_challenge_method(method: &str) -> Result<(), AuthError> {
    if method == "S256" {
        Ok(())
    } else {
        Err(AuthError::invalid_request(format!(
            "code_challenge_method must be S256, got {method}"
        )))
    }
}

/// Verifies a code verifier against the stored S256 challenge.
///
/// # Errors
///
/// Returns `invalid_grant` when the verifier is malformed or does not match.
pub fn verify_challenge(challenge: &str, verifier: &str) -> Result<(), AuthError> {
    if verifier.len() < MIN_VERIFIER_LEN || verifier.len() > MAX_VERIFIER_LEN {
        return Err(AuthError::invalid_grant(
            "code_verifier length out of range",
        ));
    }
    if !verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    {
        return Err(AuthError::invalid_grant(
            "code_verifier contains invalid characters",
        ));
    }

    let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    if computed == challenge {
        Ok(())
    } else {
        Err(AuthError::invalid_grant("PKCE verification failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B test vector.
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_rfc7636_vector() {
        assert!(verify_challenge(CHALLENGE, VERIFIER).is_ok());
    }

    #[test]
    fn test_wrong_verifier_fails() {
        let wrong = "aBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert!(verify_challenge(CHALLENGE, wrong).is_err());
    }

    #[test]
    fn test_verifier_length_enforced() {
        assert!(verify_challenge(CHALLENGE, "short").is_err());
        let too_long = "a".repeat(129);
        assert!(verify_challenge(CHALLENGE, &too_long).is_err());
    }

    #[test]
    fn test_verifier_charset_enforced() {
        let bad = format!("{}!", &"a".repeat(43));
        assert!(verify_challenge(CHALLENGE, &bad).is_err());
    }

    #[test]
    fn test_only_s256_method_allowed() {
        assert!(validate_challenge_method("S256").is_ok());
        assert!(validate_challenge_method("plain").is_err());
        assert!(validate_challenge_method("S512").is_err());
    }
}
