//! JWS signing and verification.
//!
//! Verification is strict about algorithm binding: the caller names the
//! algorithm it expects (from client registration or server policy) and a
//! token declaring anything else is rejected before any key work happens.
//! Key material is resolved from the server key pair, a client JWKS (by
//! `kid`, falling back to trying every key of the right type), or a shared
//! secret for the HMAC family.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use time::OffsetDateTime;

use crate::alg::SignatureAlgorithm;
use crate::error::JoseError;
use crate::jwk::{Jwks, SigningKeyPair};

// =============================================================================
// Compact Header
// =============================================================================

/// The protected header of a compact JWS or JWE, parsed without verification.
///
/// Used to route tokens (a header carrying `enc` is a JWE) and to pick the
/// verification key (`kid`) before the signature is checked.
#[derive(Debug, Clone, Deserialize)]
pub struct JoseHeader {
    /// Algorithm name as it appears on the wire.
    pub alg: String,

    /// Key id hint.
    #[serde(default)]
    pub kid: Option<String>,

    /// Content encryption algorithm. Present only on JWE headers.
    #[serde(default)]
    pub enc: Option<String>,

    /// Content type of the payload (e.g. "JWT" for nested tokens).
    #[serde(default)]
    pub cty: Option<String>,

    /// Token type.
    #[serde(default)]
    pub typ: Option<String>,
}

impl JoseHeader {
    /// Returns `true` if this header belongs to a JWE.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.enc.is_some()
    }
}

/// Parses the protected header of a compact token without verifying it.
///
/// # Errors
///
/// Returns [`JoseError::MalformedToken`] if the first segment is not
/// base64url-encoded JSON.
pub fn peek_header(token: &str) -> Result<JoseHeader, JoseError> {
    let first = token
        .split('.')
        .next()
        .ok_or_else(|| JoseError::malformed("empty token"))?;
    let raw = URL_SAFE_NO_PAD
        .decode(first)
        .map_err(|_| JoseError::malformed("header is not base64url"))?;
    serde_json::from_slice(&raw).map_err(|_| JoseError::malformed("header is not JSON"))
}

// =============================================================================
// Signing
// =============================================================================

/// Key material for producing a signature.
pub enum SigningKey<'a> {
    /// Sign with the server key pair (algorithm and `kid` come from the pair).
    KeyPair(&'a SigningKeyPair),

    /// Sign with the server key pair under a different algorithm of the same
    /// family (an RSA key signs any RS/PS variant).
    KeyPairAs {
        /// The key pair to sign with.
        pair: &'a SigningKeyPair,
        /// The algorithm to declare and use.
        alg: SignatureAlgorithm,
    },

    /// Sign with a shared secret using the given HMAC algorithm.
    Secret {
        /// The raw secret octets (a client secret's UTF-8 bytes).
        secret: &'a [u8],
        /// The HS-family algorithm.
        alg: SignatureAlgorithm,
    },

    /// Produce an unsecured JWS (`alg=none`, empty signature).
    Unsecured,
}

/// Signs claims into a compact JWS.
///
/// # Errors
///
/// Returns an error if the algorithm has no backend support or the claims
/// cannot be serialized.
pub fn sign_jws<T: Serialize>(claims: &T, key: &SigningKey<'_>) -> Result<String, JoseError> {
    match key {
        SigningKey::KeyPair(pair) => {
            let mut header = Header::new(pair.algorithm.to_jwt_algorithm()?);
            header.kid = Some(pair.kid.clone());
            encode(&header, claims, pair.encoding_key())
                .map_err(|e| JoseError::encoding(e.to_string()))
        }
        SigningKey::KeyPairAs { pair, alg } => {
            let same_family = (alg.is_rsa() && pair.algorithm.is_rsa())
                || (*alg == pair.algorithm);
            if !same_family {
                return Err(JoseError::invalid_key(format!(
                    "{alg} cannot be signed with a {} key",
                    pair.algorithm
                )));
            }
            let mut header = Header::new(alg.to_jwt_algorithm()?);
            header.kid = Some(pair.kid.clone());
            encode(&header, claims, pair.encoding_key())
                .map_err(|e| JoseError::encoding(e.to_string()))
        }
        SigningKey::Secret { secret, alg } => {
            if !alg.is_symmetric() {
                return Err(JoseError::invalid_key(format!(
                    "{alg} cannot be used with a shared secret"
                )));
            }
            let header = Header::new(alg.to_jwt_algorithm()?);
            encode(&header, claims, &EncodingKey::from_secret(secret))
                .map_err(|e| JoseError::encoding(e.to_string()))
        }
        SigningKey::Unsecured => {
            let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
            let payload = serde_json::to_vec(claims).map_err(|e| JoseError::encoding(e.to_string()))?;
            let payload = URL_SAFE_NO_PAD.encode(payload);
            Ok(format!("{header}.{payload}."))
        }
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Key material for verifying a signature.
pub enum VerificationKey<'a> {
    /// Verify against the server key pair's public half.
    KeyPair(&'a SigningKeyPair),

    /// Resolve a key from a client's JWKS document.
    Jwks(&'a Jwks),

    /// Verify an HMAC signature with a shared secret.
    Secret(&'a [u8]),
}

/// Options controlling claim validation during verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Whether to reject tokens whose `exp` is in the past.
    pub validate_exp: bool,

    /// Expected `iss` value, if any.
    pub expected_issuer: Option<String>,

    /// Expected `aud` value, if any.
    pub expected_audience: Option<String>,

    /// Whether `alg=none` tokens are acceptable. Off by default.
    pub allow_unsecured: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            validate_exp: true,
            expected_issuer: None,
            expected_audience: None,
            allow_unsecured: false,
        }
    }
}

impl VerifyOptions {
    /// Disables `exp` validation.
    #[must_use]
    pub fn without_exp(mut self) -> Self {
        self.validate_exp = false;
        self
    }

    /// Sets the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Sets the expected audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    /// Permits `alg=none` tokens.
    #[must_use]
    pub fn with_unsecured_allowed(mut self) -> Self {
        self.allow_unsecured = true;
        self
    }
}

/// Verifies a compact JWS against the expected algorithm and key material,
/// returning the deserialized claims.
///
/// The token's declared `alg` must exactly match `alg`; a mismatch is a
/// [`JoseError::SignatureInvalid`], not a fallback.
///
/// # Errors
///
/// Returns an error if the token is malformed, the algorithm is unsupported,
/// no key resolves, the signature fails, or validation of `exp`/`iss`/`aud`
/// fails.
pub fn verify_jws<T: DeserializeOwned>(
    token: &str,
    alg: SignatureAlgorithm,
    key: &VerificationKey<'_>,
    opts: &VerifyOptions,
) -> Result<T, JoseError> {
    let header = peek_header(token)?;
    if header.is_encrypted() {
        return Err(JoseError::malformed("expected a JWS, found a JWE"));
    }
    if header.alg != alg.as_str() {
        return Err(JoseError::SignatureInvalid);
    }

    if alg == SignatureAlgorithm::None {
        if !opts.allow_unsecured {
            return Err(JoseError::unsupported("none"));
        }
        return decode_unsecured(token, opts);
    }

    let backend_alg = alg.to_jwt_algorithm()?;
    let mut validation = Validation::new(backend_alg);
    // Claims presence is the caller's concern; only what the options name
    // is validated here.
    validation.required_spec_claims.clear();
    validation.validate_exp = opts.validate_exp;
    validation.validate_aud = opts.expected_audience.is_some();
    if let Some(ref aud) = opts.expected_audience {
        validation.set_audience(&[aud]);
    }
    if let Some(ref iss) = opts.expected_issuer {
        validation.set_issuer(&[iss]);
    }

    match key {
        VerificationKey::KeyPair(pair) => {
            let data = decode::<T>(token, pair.decoding_key(), &validation)?;
            Ok(data.claims)
        }
        VerificationKey::Secret(secret) => {
            if !alg.is_symmetric() {
                return Err(JoseError::invalid_key(format!(
                    "{alg} cannot be verified with a shared secret"
                )));
            }
            let data = decode::<T>(token, &DecodingKey::from_secret(secret), &validation)?;
            Ok(data.claims)
        }
        VerificationKey::Jwks(jwks) => {
            if alg.is_symmetric() {
                return Err(JoseError::invalid_key(format!(
                    "{alg} cannot be verified against a JWKS"
                )));
            }
            verify_against_jwks(token, alg, jwks, header.kid.as_deref(), &validation)
        }
    }
}

/// Tries the `kid`-named key first, then every key of the right type.
fn verify_against_jwks<T: DeserializeOwned>(
    token: &str,
    alg: SignatureAlgorithm,
    jwks: &Jwks,
    kid: Option<&str>,
    validation: &Validation,
) -> Result<T, JoseError> {
    if let Some(kid) = kid {
        let jwk = jwks
            .find(kid)
            .ok_or_else(|| JoseError::key_not_found(kid))?;
        let data = decode::<T>(token, &jwk.to_decoding_key()?, validation)?;
        return Ok(data.claims);
    }

    let kty = if alg.is_ec() { "EC" } else { "RSA" };
    let mut last_err = JoseError::key_not_found("<none>");
    for jwk in jwks.of_type(kty) {
        let decoding_key = match jwk.to_decoding_key() {
            Ok(k) => k,
            Err(e) => {
                last_err = e;
                continue;
            }
        };
        match decode::<T>(token, &decoding_key, validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) => last_err = e.into(),
        }
    }
    Err(last_err)
}

/// Decodes an `alg=none` token, enforcing an empty signature segment and
/// validating `exp`/`iss`/`aud` manually.
fn decode_unsecured<T: DeserializeOwned>(
    token: &str,
    opts: &VerifyOptions,
) -> Result<T, JoseError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(JoseError::malformed("unsecured JWS must have three segments"));
    }
    if !parts[2].is_empty() {
        return Err(JoseError::SignatureInvalid);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| JoseError::malformed("payload is not base64url"))?;
    let value: serde_json::Value =
        serde_json::from_slice(&payload).map_err(|_| JoseError::malformed("payload is not JSON"))?;

    if opts.validate_exp {
        // Like the signed path: a present exp must be in the future, an
        // absent exp is not required.
        if let Some(exp) = value.get("exp").and_then(serde_json::Value::as_i64) {
            if exp < OffsetDateTime::now_utc().unix_timestamp() {
                return Err(JoseError::Expired);
            }
        }
    }
    if let Some(ref iss) = opts.expected_issuer {
        if value.get("iss").and_then(serde_json::Value::as_str) != Some(iss.as_str()) {
            return Err(JoseError::SignatureInvalid);
        }
    }
    if let Some(ref aud) = opts.expected_audience {
        let matches = match value.get("aud") {
            Some(serde_json::Value::String(s)) => s == aud,
            Some(serde_json::Value::Array(arr)) => {
                arr.iter().any(|v| v.as_str() == Some(aud.as_str()))
            }
            _ => false,
        };
        if !matches {
            return Err(JoseError::SignatureInvalid);
        }
    }

    serde_json::from_value(value).map_err(|e| JoseError::encoding(e.to_string()))
}

// =============================================================================
// Secret-derived keys
// =============================================================================

/// Derives a symmetric key of `len` bytes from a client secret (OIDC Core
/// Section 10.2 style): a SHA-2 digest of the UTF-8 secret octets, truncated.
///
/// The digest is picked to be at least as long as the requested key.
#[must_use]
pub fn derive_secret_key(client_secret: &str, len: usize) -> Vec<u8> {
    let digest: Vec<u8> = if len <= 32 {
        Sha256::digest(client_secret.as_bytes()).to_vec()
    } else if len <= 48 {
        Sha384::digest(client_secret.as_bytes()).to_vec()
    } else {
        Sha512::digest(client_secret.as_bytes()).to_vec()
    };
    digest[..len.min(digest.len())].to_vec()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
        iss: String,
    }

    fn make_claims() -> TestClaims {
        TestClaims {
            sub: "user-1".to_string(),
            exp: OffsetDateTime::now_utc().unix_timestamp() + 600,
            iss: "https://auth.example.com".to_string(),
        }
    }

    #[test]
    fn test_rs256_sign_verify_roundtrip() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let token = sign_jws(&make_claims(), &SigningKey::KeyPair(&pair)).unwrap();

        let claims: TestClaims = verify_jws(
            &token,
            SignatureAlgorithm::RS256,
            &VerificationKey::KeyPair(&pair),
            &VerifyOptions::default(),
        )
        .unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_ps512_sign_verify_roundtrip() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::PS512).unwrap();
        let token = sign_jws(&make_claims(), &SigningKey::KeyPair(&pair)).unwrap();

        let claims: TestClaims = verify_jws(
            &token,
            SignatureAlgorithm::PS512,
            &VerificationKey::KeyPair(&pair),
            &VerifyOptions::default(),
        )
        .unwrap();
        assert_eq!(claims.iss, "https://auth.example.com");
    }

    #[test]
    fn test_es384_sign_verify_roundtrip() {
        let pair = SigningKeyPair::generate_ec().unwrap();
        let token = sign_jws(&make_claims(), &SigningKey::KeyPair(&pair)).unwrap();

        let claims: TestClaims = verify_jws(
            &token,
            SignatureAlgorithm::ES384,
            &VerificationKey::KeyPair(&pair),
            &VerifyOptions::default(),
        )
        .unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_hs256_with_client_secret() {
        let secret = b"a-very-confidential-client-secret";
        let token = sign_jws(
            &make_claims(),
            &SigningKey::Secret {
                secret,
                alg: SignatureAlgorithm::HS256,
            },
        )
        .unwrap();

        let claims: TestClaims = verify_jws(
            &token,
            SignatureAlgorithm::HS256,
            &VerificationKey::Secret(secret),
            &VerifyOptions::default(),
        )
        .unwrap();
        assert_eq!(claims.sub, "user-1");

        // Wrong secret fails.
        let err = verify_jws::<TestClaims>(
            &token,
            SignatureAlgorithm::HS256,
            &VerificationKey::Secret(b"wrong"),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, JoseError::SignatureInvalid));
    }

    #[test]
    fn test_alg_mismatch_rejected() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let token = sign_jws(&make_claims(), &SigningKey::KeyPair(&pair)).unwrap();

        // Token says RS256; caller expects RS384.
        let err = verify_jws::<TestClaims>(
            &token,
            SignatureAlgorithm::RS384,
            &VerificationKey::KeyPair(&pair),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, JoseError::SignatureInvalid));
    }

    #[test]
    fn test_jwks_resolution_by_kid() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let mut jwks = Jwks::new();
        jwks.add_key(pair.to_jwk());

        let token = sign_jws(&make_claims(), &SigningKey::KeyPair(&pair)).unwrap();
        let claims: TestClaims = verify_jws(
            &token,
            SignatureAlgorithm::RS256,
            &VerificationKey::Jwks(&jwks),
            &VerifyOptions::default(),
        )
        .unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_jwks_unknown_kid() {
        let signer = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let other = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let mut jwks = Jwks::new();
        jwks.add_key(other.to_jwk());

        let token = sign_jws(&make_claims(), &SigningKey::KeyPair(&signer)).unwrap();
        let err = verify_jws::<TestClaims>(
            &token,
            SignatureAlgorithm::RS256,
            &VerificationKey::Jwks(&jwks),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, JoseError::KeyNotFound { .. }));
    }

    #[test]
    fn test_unsecured_requires_opt_in() {
        let token = sign_jws(&make_claims(), &SigningKey::Unsecured).unwrap();
        assert!(token.ends_with('.'));

        let err = verify_jws::<TestClaims>(
            &token,
            SignatureAlgorithm::None,
            &VerificationKey::Secret(b""),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, JoseError::UnsupportedAlgorithm { .. }));

        let claims: TestClaims = verify_jws(
            &token,
            SignatureAlgorithm::None,
            &VerificationKey::Secret(b""),
            &VerifyOptions::default().with_unsecured_allowed(),
        )
        .unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_expired_token_rejected() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let claims = TestClaims {
            sub: "user-1".to_string(),
            exp: OffsetDateTime::now_utc().unix_timestamp() - 600,
            iss: "https://auth.example.com".to_string(),
        };
        let token = sign_jws(&claims, &SigningKey::KeyPair(&pair)).unwrap();

        let err = verify_jws::<TestClaims>(
            &token,
            SignatureAlgorithm::RS256,
            &VerificationKey::KeyPair(&pair),
            &VerifyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, JoseError::Expired));

        // Expiry check can be disabled for introspection-style decodes.
        let decoded: TestClaims = verify_jws(
            &token,
            SignatureAlgorithm::RS256,
            &VerificationKey::KeyPair(&pair),
            &VerifyOptions::default().without_exp(),
        )
        .unwrap();
        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn test_peek_header() {
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS384).unwrap();
        let token = sign_jws(&make_claims(), &SigningKey::KeyPair(&pair)).unwrap();
        let header = peek_header(&token).unwrap();
        assert_eq!(header.alg, "RS384");
        assert_eq!(header.kid.as_deref(), Some(pair.kid.as_str()));
        assert!(!header.is_encrypted());
    }

    #[test]
    fn test_derive_secret_key_lengths() {
        let k16 = derive_secret_key("secret", 16);
        let k32 = derive_secret_key("secret", 32);
        let k48 = derive_secret_key("secret", 48);
        assert_eq!(k16.len(), 16);
        assert_eq!(k32.len(), 32);
        assert_eq!(k48.len(), 48);
        // Truncation is a prefix of the same digest.
        assert_eq!(k16[..], k32[..16]);
        // Stable across calls.
        assert_eq!(k32, derive_secret_key("secret", 32));
        assert_ne!(k32, derive_secret_key("other", 32));
    }
}
