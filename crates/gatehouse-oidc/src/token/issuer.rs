//! Token issuance: claims assembly, signing, and optional ID token
//! encryption.
//!
//! The server holds a [`KeyRing`] of one RSA and one P-384 key pair. An RSA
//! key signs every RS/PS variant, the EC key signs ES384, and the HS family
//! signs with the client's secret. The registration validator only admits
//! algorithms this ring can produce.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use gatehouse_jose::{
    ContentEncryptionAlgorithm, JweEncryptionKey, Jwks, SignatureAlgorithm, SigningKey,
    SigningKeyPair, encrypt_compact, half_hash, sign_jws,
};

use crate::AuthResult;
use crate::config::TokenPolicy;
use crate::error::AuthError;
use crate::oauth::authorize::ClaimsRequest;
use crate::oauth::pairwise::PairwiseSubjectResolver;
use crate::storage::TokenStorage;
use crate::types::{AccessTokenRecord, Client, RefreshTokenRecord};

// =============================================================================
// Key Ring
// =============================================================================

/// The server's signing keys.
pub struct KeyRing {
    rsa: Arc<SigningKeyPair>,
    ec: Arc<SigningKeyPair>,
}

impl KeyRing {
    /// Generates a fresh RSA-2048 and P-384 key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> AuthResult<Self> {
        Ok(Self {
            rsa: Arc::new(SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256)?),
            ec: Arc::new(SigningKeyPair::generate_ec()?),
        })
    }

    /// Creates a ring from existing key pairs.
    #[must_use]
    pub fn new(rsa: Arc<SigningKeyPair>, ec: Arc<SigningKeyPair>) -> Self {
        Self { rsa, ec }
    }

    /// The RSA key pair (also the JWE key-transport decryption key).
    #[must_use]
    pub fn rsa(&self) -> &Arc<SigningKeyPair> {
        &self.rsa
    }

    /// Resolves the signing key for an asymmetric algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error for algorithms outside the ring's capability set.
    pub fn signing_key_for(&self, alg: SignatureAlgorithm) -> AuthResult<SigningKey<'_>> {
        if alg.is_rsa() {
            return Ok(SigningKey::KeyPairAs {
                pair: self.rsa.as_ref(),
                alg,
            });
        }
        if alg == SignatureAlgorithm::ES384 {
            return Ok(SigningKey::KeyPair(self.ec.as_ref()));
        }
        Err(AuthError::internal(format!(
            "no server key can sign {alg}"
        )))
    }

    /// The published key set.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        let mut jwks = Jwks::new();
        jwks.add_key(self.rsa.to_jwk());
        jwks.add_key(self.ec.to_jwk());
        jwks
    }
}

// =============================================================================
// Claims
// =============================================================================

/// Access token JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer URL.
    pub iss: String,

    /// Subject (absent for client-credentials tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience: the client the token was issued to.
    pub aud: String,

    /// Expiry, unix seconds.
    pub exp: i64,

    /// Issued-at, unix seconds.
    pub iat: i64,

    /// Token identifier, the storage key for revocation checks.
    pub jti: String,

    /// Space-separated granted scope.
    pub scope: String,

    /// The client id, for resource servers that don't inspect `aud`.
    pub client_id: String,

    /// Session identifier, when user-bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// ID token JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer URL.
    pub iss: String,

    /// Subject: the public or pairwise identifier.
    pub sub: String,

    /// Audience: the client id.
    pub aud: String,

    /// Expiry, unix seconds.
    pub exp: i64,

    /// Issued-at, unix seconds.
    pub iat: i64,

    /// When the user actively authenticated, unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Replay-protection nonce from the authorization request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Left-half hash of the sibling access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,

    /// Left-half hash of the sibling authorization code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,

    /// Session identifier, consumed by end-session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Claims admitted via the claims request.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// =============================================================================
// Token Issuer
// =============================================================================

/// Everything an ID token issuance needs to know about its context.
pub struct IdTokenContext<'a> {
    /// The authenticated user id (pre-pairwise).
    pub user_id: &'a str,

    /// The authentication session.
    pub session_id: Option<&'a str>,

    /// When the user authenticated.
    pub auth_time: Option<OffsetDateTime>,

    /// Nonce from the authorization request.
    pub nonce: Option<&'a str>,

    /// Claim requests carried from the authorization request.
    pub claims_request: Option<&'a ClaimsRequest>,

    /// The sibling access token, when one was issued.
    pub access_token: Option<&'a str>,

    /// The sibling authorization code, when one was issued.
    pub code: Option<&'a str>,
}

/// Builds, signs, stores, and (for ID tokens) optionally encrypts tokens.
pub struct TokenIssuer {
    issuer: String,
    policy: TokenPolicy,
    keys: Arc<KeyRing>,
    tokens: Arc<dyn TokenStorage>,
    pairwise: Arc<PairwiseSubjectResolver>,
}

impl TokenIssuer {
    /// Creates a new issuer.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        policy: TokenPolicy,
        keys: Arc<KeyRing>,
        tokens: Arc<dyn TokenStorage>,
        pairwise: Arc<PairwiseSubjectResolver>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            policy,
            keys,
            tokens,
            pairwise,
        }
    }

    /// The configured issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The key ring.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// The token policy.
    #[must_use]
    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Issues and stores an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or storage fails.
    pub async fn issue_access_token(
        &self,
        client: &Client,
        grant_id: Uuid,
        user_id: Option<&str>,
        session_id: Option<&str>,
        scopes: &BTreeSet<String>,
        issuance_id: Uuid,
        code_id: Option<Uuid>,
    ) -> AuthResult<(String, AccessTokenRecord)> {
        let now = OffsetDateTime::now_utc();
        let lifetime = Duration::seconds(self.policy.access_token_lifetime.as_secs() as i64);
        let jti = Uuid::new_v4().to_string();

        let sub = match user_id {
            Some(user_id) => Some(self.pairwise.resolve(user_id, client).await?),
            None => None,
        };

        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub,
            aud: client.client_id.clone(),
            exp: (now + lifetime).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: jti.clone(),
            scope: join_scopes(scopes),
            client_id: client.client_id.clone(),
            sid: session_id.map(str::to_string),
        };

        let token = sign_jws(&claims, &SigningKey::KeyPair(self.keys.rsa().as_ref()))?;

        let record = AccessTokenRecord {
            jti,
            client_id: client.client_id.clone(),
            grant_id,
            user_id: user_id.map(str::to_string),
            session_id: session_id.map(str::to_string),
            scopes: scopes.clone(),
            issuance_id,
            code_id,
            issued_at: now,
            expires_at: now + lifetime,
            revoked_at: None,
        };
        self.tokens.create_access(&record).await?;
        Ok((token, record))
    }

    /// Issues and stores a refresh token, returning the plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn issue_refresh_token(
        &self,
        client: &Client,
        grant_id: Uuid,
        user_id: &str,
        scopes: &BTreeSet<String>,
        issuance_id: Uuid,
        code_id: Option<Uuid>,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let plaintext = RefreshTokenRecord::generate_token();

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: RefreshTokenRecord::hash_token(&plaintext),
            client_id: client.client_id.clone(),
            user_id: user_id.to_string(),
            grant_id,
            scopes: scopes.clone(),
            issuance_id,
            code_id,
            created_at: now,
            expires_at: Some(
                now + Duration::seconds(self.policy.refresh_token_lifetime.as_secs() as i64),
            ),
            revoked_at: None,
        };
        self.tokens.create_refresh(&record).await?;
        Ok(plaintext)
    }

    /// Issues an ID token: pairwise subject, artifact hashes, requested
    /// claims, signature per registration, optional encryption to the
    /// client.
    ///
    /// # Errors
    ///
    /// Returns an error if subject resolution, signing, or encryption
    /// fails.
    pub async fn issue_id_token(
        &self,
        client: &Client,
        context: IdTokenContext<'_>,
    ) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let alg = client.id_token_signed_response_alg;
        let sub = self.pairwise.resolve(context.user_id, client).await?;

        let at_hash = context
            .access_token
            .map(|token| half_hash(token, alg))
            .transpose()?;
        let c_hash = context.code.map(|code| half_hash(code, alg)).transpose()?;

        let mut extra = serde_json::Map::new();
        if let Some(request) = context.claims_request {
            for (name, entry) in &request.id_token {
                let Some(entry) = entry else { continue };
                // Claims constrained to a specific value are echoed as
                // such; everything else is sourced at userinfo time.
                if let Some(value) = &entry.value {
                    extra.insert(name.clone(), value.clone());
                } else if let Some(values) = &entry.values {
                    if let Some(first) = values.first() {
                        extra.insert(name.clone(), first.clone());
                    }
                }
            }
        }

        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub,
            aud: client.client_id.clone(),
            exp: (now + Duration::seconds(self.policy.id_token_lifetime.as_secs() as i64))
                .unix_timestamp(),
            iat: now.unix_timestamp(),
            auth_time: context.auth_time.map(OffsetDateTime::unix_timestamp),
            nonce: context.nonce.map(str::to_string),
            at_hash,
            c_hash,
            sid: context.session_id.map(str::to_string),
            extra,
        };

        let signed = if alg.is_symmetric() {
            let secret = client
                .client_secret
                .as_deref()
                .ok_or_else(|| AuthError::invalid_client("client has no secret for HS signing"))?;
            sign_jws(
                &claims,
                &SigningKey::Secret {
                    secret: secret.as_bytes(),
                    alg,
                },
            )?
        } else {
            sign_jws(&claims, &self.keys.signing_key_for(alg)?)?
        };

        self.maybe_encrypt_id_token(client, signed)
    }

    /// Encrypts a signed ID token to the client, when registered for it.
    fn maybe_encrypt_id_token(&self, client: &Client, signed: String) -> AuthResult<String> {
        let Some(alg) = client.id_token_encrypted_response_alg else {
            return Ok(signed);
        };
        let enc = client
            .id_token_encrypted_response_enc
            .unwrap_or(ContentEncryptionAlgorithm::A128Gcm);

        let token = if alg.is_rsa() {
            let jwks = client.jwks.as_ref().ok_or_else(|| {
                AuthError::invalid_client("client registered no keys for ID token encryption")
            })?;
            let jwk = jwks.of_type("RSA").next().ok_or_else(|| {
                AuthError::invalid_client("client JWKS holds no RSA key")
            })?;
            let public = jwk.to_rsa_public_key()?;
            encrypt_compact(
                signed.as_bytes(),
                alg,
                enc,
                &JweEncryptionKey::RsaPublic(&public),
                Some("JWT"),
            )?
        } else {
            let secret = client.client_secret.as_deref().ok_or_else(|| {
                AuthError::invalid_client("symmetric ID token encryption requires a secret")
            })?;
            let kek = gatehouse_jose::derive_secret_key(secret, alg.kek_len());
            encrypt_compact(
                signed.as_bytes(),
                alg,
                enc,
                &JweEncryptionKey::Symmetric(&kek),
                Some("JWT"),
            )?
        };
        Ok(token)
    }
}

/// Joins a scope set into the space-separated wire form.
#[must_use]
pub fn join_scopes(scopes: &BTreeSet<String>) -> String {
    scopes.iter().cloned().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// Tests
// =============================================================================
