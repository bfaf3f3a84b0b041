//! Request object processing (OIDC Core Section 6).
//!
//! The `request` parameter carries authorization parameters inside a JWT,
//! optionally nested in a JWE. Processing order: decrypt (server private
//! key for RSA transport, client-secret-derived KEK for AES key wrap),
//! verify the JWS under the client's registered
//! `request_object_signing_alg`, then overlay every verified claim onto
//! the corresponding top-level query parameter. Nested claim requests are
//! carried through to artifact issuance.

use std::sync::Arc;

use gatehouse_jose::{
    JweDecryptionKey, KeyManagementAlgorithm, SignatureAlgorithm, SigningKeyPair, VerificationKey,
    VerifyOptions, decrypt_compact, derive_secret_key, peek_header, verify_jws,
};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::authorize::{AuthorizationRequest, ClaimsRequest};
use crate::registration::sector::{RemoteDocumentFetcher, fetch_jwks};
use crate::types::Client;

/// Processes `request` parameters against client registrations.
pub struct RequestObjectProcessor {
    server_key: Arc<SigningKeyPair>,
    fetcher: Arc<dyn RemoteDocumentFetcher>,
    allow_unsigned: bool,
}

impl RequestObjectProcessor {
    /// Creates a new processor.
    ///
    /// `server_key` must be the RSA key pair clients encrypt to;
    /// `allow_unsigned` mirrors the server policy for `alg=none`.
    #[must_use]
    pub fn new(
        server_key: Arc<SigningKeyPair>,
        fetcher: Arc<dyn RemoteDocumentFetcher>,
        allow_unsigned: bool,
    ) -> Self {
        Self {
            server_key,
            fetcher,
            allow_unsigned,
        }
    }

    /// Applies a request object, if present, returning the effective
    /// request and any carried claims request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidRequestObject`] on decryption failure,
    /// signature failure, a disallowed `none` algorithm, or malformed
    /// claims.
    pub async fn apply(
        &self,
        request: AuthorizationRequest,
        client: &Client,
    ) -> AuthResult<(AuthorizationRequest, Option<ClaimsRequest>)> {
        let Some(token) = request.request.clone() else {
            let claims = request.parse_claims()?;
            return Ok((request, claims));
        };

        let jws = self.unwrap_encryption(&token, client)?;
        let object = self.verify(&jws, client).await?;
        let overlaid = overlay(request, &object)?;

        let claims_request = match object.get("claims") {
            Some(value) => Some(serde_json::from_value(value.clone()).map_err(|_| {
                AuthError::invalid_request_object("claims member is malformed")
            })?),
            None => overlaid.parse_claims()?,
        };

        Ok((overlaid, claims_request))
    }

    /// Decrypts an outer JWE, when present, yielding the inner JWS.
    fn unwrap_encryption(&self, token: &str, client: &Client) -> AuthResult<String> {
        let header = peek_header(token)
            .map_err(|_| AuthError::invalid_request_object("request is not a JOSE token"))?;
        if !header.is_encrypted() {
            return Ok(token.to_string());
        }

        let alg = KeyManagementAlgorithm::parse(&header.alg)
            .map_err(|_| AuthError::invalid_request_object("unknown encryption algorithm"))?;

        let plaintext = if alg.is_rsa() {
            decrypt_compact(
                token,
                &JweDecryptionKey::RsaPrivatePem(self.server_key.private_key_pem()),
            )
        } else {
            let secret = client.client_secret.as_deref().ok_or_else(|| {
                AuthError::invalid_request_object(
                    "symmetric encryption requires a client secret",
                )
            })?;
            let kek = derive_secret_key(secret, alg.kek_len());
            decrypt_compact(token, &JweDecryptionKey::Symmetric(&kek))
        }
        .map_err(|_| AuthError::invalid_request_object("decryption failed"))?
        .0;

        String::from_utf8(plaintext)
            .map_err(|_| AuthError::invalid_request_object("decrypted payload is not UTF-8"))
    }

    /// Verifies the JWS under the registration-declared algorithm and
    /// returns its claims.
    async fn verify(
        &self,
        jws: &str,
        client: &Client,
    ) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
        let header = peek_header(jws)
            .map_err(|_| AuthError::invalid_request_object("request is not a JWS"))?;
        let header_alg = SignatureAlgorithm::parse(&header.alg)
            .map_err(|_| AuthError::invalid_request_object("unknown signing algorithm"))?;

        // The registration pins the algorithm; without one, the header's
        // declared algorithm is accepted.
        let alg = client.request_object_signing_alg.unwrap_or(header_alg);
        if alg != header_alg {
            return Err(AuthError::invalid_request_object(format!(
                "request object must be signed with {alg}"
            )));
        }

        if alg == SignatureAlgorithm::None {
            if !self.allow_unsigned {
                return Err(AuthError::invalid_request_object(
                    "unsigned request objects are not allowed",
                ));
            }
            let opts = VerifyOptions {
                validate_exp: true,
                expected_issuer: None,
                expected_audience: None,
                allow_unsecured: true,
            };
            return verify_jws(jws, alg, &VerificationKey::Secret(&[]), &opts)
                .map_err(|_| AuthError::invalid_request_object("malformed unsigned request"));
        }

        let opts = VerifyOptions::default();
        if alg.is_symmetric() {
            let secret = client.client_secret.as_deref().ok_or_else(|| {
                AuthError::invalid_request_object("HS signatures require a client secret")
            })?;
            verify_jws(jws, alg, &VerificationKey::Secret(secret.as_bytes()), &opts)
                .map_err(|_| AuthError::invalid_request_object("signature verification failed"))
        } else {
            let jwks = match (&client.jwks, &client.jwks_uri) {
                (Some(jwks), _) => jwks.clone(),
                (None, Some(uri)) => fetch_jwks(self.fetcher.as_ref(), uri).await.map_err(|_| {
                    AuthError::invalid_request_object("client JWKS could not be fetched")
                })?,
                (None, None) => {
                    return Err(AuthError::invalid_request_object(
                        "client registered no keys for request object signatures",
                    ));
                }
            };
            verify_jws(jws, alg, &VerificationKey::Jwks(&jwks), &opts)
                .map_err(|_| AuthError::invalid_request_object("signature verification failed"))
        }
    }
}

/// Overlays verified request object claims onto the query parameters.
/// Every claim present in the object wins over its query twin.
fn overlay(
    mut request: AuthorizationRequest,
    object: &serde_json::Map<String, serde_json::Value>,
) -> AuthResult<AuthorizationRequest> {
    if let Some(client_id) = string_claim(object, "client_id") {
        if client_id != request.client_id {
            return Err(AuthError::invalid_request_object(
                "client_id inside the request object does not match",
            ));
        }
    }

    if let Some(value) = string_claim(object, "response_type") {
        request.response_type = value;
    }
    for (claim, slot) in [
        ("redirect_uri", &mut request.redirect_uri),
        ("scope", &mut request.scope),
        ("state", &mut request.state),
        ("nonce", &mut request.nonce),
        ("response_mode", &mut request.response_mode),
        ("prompt", &mut request.prompt),
        ("code_challenge", &mut request.code_challenge),
        ("code_challenge_method", &mut request.code_challenge_method),
    ] {
        if let Some(value) = string_claim(object, claim) {
            *slot = Some(value);
        }
    }
    if let Some(claims) = object.get("claims") {
        request.claims = Some(claims.to_string());
    }
    Ok(request)
}

fn string_claim(
    object: &serde_json::Map<String, serde_json::Value>,
    claim: &str,
) -> Option<String> {
    object
        .get(claim)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::sector::StubFetcher;
    use crate::types::client::make_web_client;
    use gatehouse_jose::{
        ContentEncryptionAlgorithm, JweEncryptionKey, SigningKey, encrypt_compact, sign_jws,
    };
    use serde_json::json;

    fn processor(allow_unsigned: bool) -> RequestObjectProcessor {
        let server_key = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        RequestObjectProcessor::new(
            Arc::new(server_key),
            Arc::new(StubFetcher::new()),
            allow_unsigned,
        )
    }

    fn base_request() -> AuthorizationRequest {
        AuthorizationRequest {
            response_type: "code".to_string(),
            client_id: "test-client".to_string(),
            redirect_uri: Some("https://app.example.com/callback".to_string()),
            scope: Some("openid".to_string()),
            state: Some("outer-state".to_string()),
            ..Default::default()
        }
    }

    fn object_claims() -> serde_json::Value {
        json!({
            "client_id": "test-client",
            "scope": "openid profile",
            "state": "inner-state",
            "nonce": "n-0S6_WzA2Mj",
            "claims": {"id_token": {"auth_time": {"essential": true}}}
        })
    }

    #[tokio::test]
    async fn test_no_request_object_passthrough() {
        let processor = processor(false);
        let client = make_web_client();
        let (request, claims) = processor.apply(base_request(), &client).await.unwrap();
        assert_eq!(request.state.as_deref(), Some("outer-state"));
        assert!(claims.is_none());
    }

    #[tokio::test]
    async fn test_hs256_request_object_overrides_parameters() {
        let processor = processor(false);
        let mut client = make_web_client();
        client.request_object_signing_alg = Some(SignatureAlgorithm::HS256);

        let token = sign_jws(
            &object_claims(),
            &SigningKey::Secret {
                secret: b"secret-value",
                alg: SignatureAlgorithm::HS256,
            },
        )
        .unwrap();

        let mut request = base_request();
        request.request = Some(token);
        let (effective, claims) = processor.apply(request, &client).await.unwrap();

        // Object claims override the outer parameters.
        assert_eq!(effective.scope.as_deref(), Some("openid profile"));
        assert_eq!(effective.state.as_deref(), Some("inner-state"));
        assert_eq!(effective.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        // Untouched parameters survive.
        assert_eq!(
            effective.redirect_uri.as_deref(),
            Some("https://app.example.com/callback")
        );
        // The nested claims request is carried through.
        let claims = claims.unwrap();
        assert_eq!(
            claims.id_token["auth_time"].as_ref().unwrap().essential,
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_rs256_request_object_via_client_jwks() {
        let processor = processor(false);
        let pair = SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap();
        let mut jwks = gatehouse_jose::Jwks::new();
        jwks.add_key(pair.to_jwk());

        let mut client = make_web_client();
        client.request_object_signing_alg = Some(SignatureAlgorithm::RS256);
        client.jwks = Some(jwks);

        let token = sign_jws(&object_claims(), &SigningKey::KeyPair(&pair)).unwrap();
        let mut request = base_request();
        request.request = Some(token);

        let (effective, _) = processor.apply(request, &client).await.unwrap();
        assert_eq!(effective.scope.as_deref(), Some("openid profile"));
    }

    #[tokio::test]
    async fn test_wrong_algorithm_rejected() {
        let processor = processor(false);
        let mut client = make_web_client();
        client.request_object_signing_alg = Some(SignatureAlgorithm::RS256);

        // Client signs HS256 although RS256 was registered.
        let token = sign_jws(
            &object_claims(),
            &SigningKey::Secret {
                secret: b"secret-value",
                alg: SignatureAlgorithm::HS256,
            },
        )
        .unwrap();
        let mut request = base_request();
        request.request = Some(token);

        let err = processor.apply(request, &client).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequestObject { .. }));
    }

    #[tokio::test]
    async fn test_unsigned_requires_policy_opt_in() {
        let mut client = make_web_client();
        client.request_object_signing_alg = Some(SignatureAlgorithm::None);
        let token = sign_jws(&object_claims(), &SigningKey::Unsecured).unwrap();

        let strict = processor(false);
        let mut request = base_request();
        request.request = Some(token.clone());
        assert!(strict.apply(request, &client).await.is_err());

        let permissive = processor(true);
        let mut request = base_request();
        request.request = Some(token);
        let (effective, _) = permissive.apply(request, &client).await.unwrap();
        assert_eq!(effective.state.as_deref(), Some("inner-state"));
    }

    #[tokio::test]
    async fn test_encrypted_request_object_rsa() {
        let server_key =
            Arc::new(SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap());
        let processor = RequestObjectProcessor::new(
            Arc::clone(&server_key),
            Arc::new(StubFetcher::new()),
            false,
        );

        let mut client = make_web_client();
        client.request_object_signing_alg = Some(SignatureAlgorithm::HS256);

        let inner = sign_jws(
            &object_claims(),
            &SigningKey::Secret {
                secret: b"secret-value",
                alg: SignatureAlgorithm::HS256,
            },
        )
        .unwrap();
        let public = server_key.to_jwk().to_rsa_public_key().unwrap();
        let outer = encrypt_compact(
            inner.as_bytes(),
            KeyManagementAlgorithm::RsaOaep,
            ContentEncryptionAlgorithm::A256Gcm,
            &JweEncryptionKey::RsaPublic(&public),
            Some("JWT"),
        )
        .unwrap();

        let mut request = base_request();
        request.request = Some(outer);
        let (effective, _) = processor.apply(request, &client).await.unwrap();
        assert_eq!(effective.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    }

    #[tokio::test]
    async fn test_encrypted_request_object_symmetric() {
        let processor = processor(false);
        let mut client = make_web_client();
        client.request_object_signing_alg = Some(SignatureAlgorithm::HS256);

        let inner = sign_jws(
            &object_claims(),
            &SigningKey::Secret {
                secret: b"secret-value",
                alg: SignatureAlgorithm::HS256,
            },
        )
        .unwrap();
        let kek = derive_secret_key("secret-value", 16);
        let outer = encrypt_compact(
            inner.as_bytes(),
            KeyManagementAlgorithm::A128Kw,
            ContentEncryptionAlgorithm::A128Gcm,
            &JweEncryptionKey::Symmetric(&kek),
            Some("JWT"),
        )
        .unwrap();

        let mut request = base_request();
        request.request = Some(outer);
        let (effective, _) = processor.apply(request, &client).await.unwrap();
        assert_eq!(effective.scope.as_deref(), Some("openid profile"));
    }

    #[tokio::test]
    async fn test_client_id_mismatch_rejected() {
        let processor = processor(false);
        let mut client = make_web_client();
        client.request_object_signing_alg = Some(SignatureAlgorithm::HS256);

        let mut claims = object_claims();
        claims["client_id"] = json!("other-client");
        let token = sign_jws(
            &claims,
            &SigningKey::Secret {
                secret: b"secret-value",
                alg: SignatureAlgorithm::HS256,
            },
        )
        .unwrap();

        let mut request = base_request();
        request.request = Some(token);
        assert!(processor.apply(request, &client).await.is_err());
    }
}
