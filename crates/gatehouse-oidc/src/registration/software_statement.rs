//! Software statement verification (RFC 7591 Section 2.3).
//!
//! A software statement is a JWT asserting a vendor's claims about a piece
//! of client software. Its signing key resolves either through a `jwks_uri`
//! claim embedded in the statement itself or through a JWKS the server was
//! configured to trust. Verified claims seed, and override, the
//! top-level registration fields.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use gatehouse_jose::{
    Jwks, SignatureAlgorithm, VerificationKey, VerifyOptions, peek_header, verify_jws,
};

use crate::AuthResult;
use crate::error::AuthError;
use crate::registration::sector::{RemoteDocumentFetcher, fetch_jwks};

/// Verifies a software statement and returns its claims.
///
/// # Errors
///
/// Returns [`AuthError::SoftwareStatement`] when the statement is
/// malformed, unsigned, or fails verification against every resolvable key
/// source.
pub async fn verify_software_statement(
    statement: &str,
    trusted_jwks: Option<&Jwks>,
    fetcher: &dyn RemoteDocumentFetcher,
) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
    let header = peek_header(statement)
        .map_err(|_| AuthError::software_statement("statement is not a well-formed JWT"))?;
    let alg = SignatureAlgorithm::parse(&header.alg)
        .map_err(|_| AuthError::software_statement("statement algorithm is unknown"))?;
    if alg == SignatureAlgorithm::None || alg.is_symmetric() {
        return Err(AuthError::software_statement(
            "statement must carry an asymmetric signature",
        ));
    }

    // A statement may name its own key set; otherwise the server-trusted
    // set must resolve it.
    let embedded_jwks = match unverified_claim(statement, "jwks_uri")? {
        Some(uri) => Some(fetch_jwks(fetcher, &uri).await.map_err(|e| {
            AuthError::software_statement(format!("embedded jwks_uri could not be used: {e}"))
        })?),
        None => None,
    };

    let jwks = embedded_jwks
        .as_ref()
        .or(trusted_jwks)
        .ok_or_else(|| AuthError::software_statement("no key source resolves the statement"))?;

    // Statements are long-lived vendor assertions; exp is optional.
    let opts = VerifyOptions::default().without_exp();
    let claims: serde_json::Map<String, serde_json::Value> =
        verify_jws(statement, alg, &VerificationKey::Jwks(jwks), &opts)
            .map_err(|_| AuthError::software_statement("signature verification failed"))?;
    Ok(claims)
}

/// Reads one string claim from the unverified payload, for key resolution
/// before any signature check.
fn unverified_claim(statement: &str, claim: &str) -> AuthResult<Option<String>> {
    let payload = statement
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::software_statement("statement is not a JWT"))?;
    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::software_statement("statement payload is not base64url"))?;
    let value: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|_| AuthError::software_statement("statement payload is not JSON"))?;
    Ok(value
        .get(claim)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::sector::StubFetcher;
    use gatehouse_jose::{SigningKey, SigningKeyPair, sign_jws};
    use serde_json::json;

    fn vendor_claims() -> serde_json::Value {
        json!({
            "software_id": "4NRB1-0XZABZI9E6-5SM3R",
            "software_version": "2.2",
            "client_name": "Vendor App",
            "redirect_uris": ["https://vendor.example.com/cb"]
        })
    }

    #[tokio::test]
    async fn test_statement_verified_against_trusted_jwks() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let mut trusted = Jwks::new();
        trusted.add_key(pair.to_jwk());

        let statement = sign_jws(&vendor_claims(), &SigningKey::KeyPair(&pair)).unwrap();
        let claims =
            verify_software_statement(&statement, Some(&trusted), &StubFetcher::new())
                .await
                .unwrap();
        assert_eq!(
            claims.get("software_id").and_then(|v| v.as_str()),
            Some("4NRB1-0XZABZI9E6-5SM3R")
        );
    }

    #[tokio::test]
    async fn test_statement_resolves_embedded_jwks_uri() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let mut vendor_jwks = Jwks::new();
        vendor_jwks.add_key(pair.to_jwk());

        let mut claims = vendor_claims();
        claims["jwks_uri"] = json!("https://vendor.example.com/jwks.json");
        let statement = sign_jws(&claims, &SigningKey::KeyPair(&pair)).unwrap();

        let fetcher = StubFetcher::new().with_document(
            "https://vendor.example.com/jwks.json",
            serde_json::to_value(&vendor_jwks).unwrap(),
        );
        let verified = verify_software_statement(&statement, None, &fetcher)
            .await
            .unwrap();
        assert_eq!(
            verified.get("software_version").and_then(|v| v.as_str()),
            Some("2.2")
        );
    }

    #[tokio::test]
    async fn test_statement_with_no_key_source_fails() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let statement = sign_jws(&vendor_claims(), &SigningKey::KeyPair(&pair)).unwrap();

        let err = verify_software_statement(&statement, None, &StubFetcher::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SoftwareStatement { .. }));
    }

    #[tokio::test]
    async fn test_statement_signed_by_unknown_key_fails() {
        let vendor = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let other = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let mut trusted = Jwks::new();
        trusted.add_key(other.to_jwk());

        let statement = sign_jws(&vendor_claims(), &SigningKey::KeyPair(&vendor)).unwrap();
        assert!(
            verify_software_statement(&statement, Some(&trusted), &StubFetcher::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_unsigned_statement_rejected() {
        let statement = sign_jws(&vendor_claims(), &SigningKey::Unsecured).unwrap();
        let err = verify_software_statement(&statement, None, &StubFetcher::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SoftwareStatement { .. }));
    }
}
