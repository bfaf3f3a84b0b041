//! The token lifecycle manager.
//!
//! Redeems authorization codes and refresh tokens, enforces single use,
//! performs RFC 7009 revocation with cascading invalidation, and validates
//! bearer tokens for userinfo with synchronous revocation visibility.
//!
//! # Containment
//!
//! A consumed authorization code presented a second time is not merely an
//! error: every token minted from that code is revoked before the error
//! returns, so a stolen-code replay can never outlive detection.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use gatehouse_jose::{SignatureAlgorithm, VerificationKey, VerifyOptions, verify_jws};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::oracle::ResourceOwnerAuthenticator;
use crate::oauth::pairwise::PairwiseSubjectResolver;
use crate::oauth::pkce;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::storage::{ClientStorage, CodeRedemption, GrantStorage, SessionStorage, TokenStorage};
use crate::token::issuer::{
    AccessTokenClaims, IdTokenContext, TokenIssuer, join_scopes,
};
use crate::token::revocation::{RevocationRequest, TokenTypeHint};
use crate::types::{AccessTokenRecord, Client, GrantType, RefreshTokenRecord};

/// Token endpoint and lifecycle operations.
pub struct TokenService {
    issuer: Arc<TokenIssuer>,
    clients: Arc<dyn ClientStorage>,
    grants: Arc<dyn GrantStorage>,
    tokens: Arc<dyn TokenStorage>,
    sessions: Arc<dyn SessionStorage>,
    authenticator: Arc<dyn ResourceOwnerAuthenticator>,
    pairwise: Arc<PairwiseSubjectResolver>,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(
        issuer: Arc<TokenIssuer>,
        clients: Arc<dyn ClientStorage>,
        grants: Arc<dyn GrantStorage>,
        tokens: Arc<dyn TokenStorage>,
        sessions: Arc<dyn SessionStorage>,
        authenticator: Arc<dyn ResourceOwnerAuthenticator>,
        pairwise: Arc<PairwiseSubjectResolver>,
    ) -> Self {
        Self {
            issuer,
            clients,
            grants,
            tokens,
            sessions,
            authenticator,
            pairwise,
        }
    }

    /// The token issuer.
    #[must_use]
    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Dispatches a token request to the grant handler named by
    /// `grant_type`.
    ///
    /// # Errors
    ///
    /// Returns `unsupported_grant_type` for unknown grants and each
    /// handler's errors otherwise.
    pub async fn handle(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> AuthResult<TokenResponse> {
        match request.grant_type.as_str() {
            "authorization_code" => self.exchange_code(request, client).await,
            "refresh_token" => self.refresh(request, client).await,
            "client_credentials" => self.client_credentials(request, client).await,
            other => Err(AuthError::unsupported_grant_type(other)),
        }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for unknown/expired/foreign codes, redirect
    /// mismatches, and PKCE failures. A replayed code additionally revokes
    /// every token it ever produced.
    pub async fn exchange_code(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> AuthResult<TokenResponse> {
        let code_plain = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::invalid_grant("missing code parameter"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| AuthError::invalid_grant("missing redirect_uri parameter"))?;

        let code_hash = crate::types::AuthorizationCode::hash_code(code_plain);
        let code = match self.grants.consume_code(&code_hash).await? {
            CodeRedemption::FirstUse(code) => code,
            CodeRedemption::Replay(code) => {
                let revoked = self.tokens.revoke_code_lineage(code.code_id).await?;
                warn!(
                    client_id = %code.client_id,
                    revoked,
                    "authorization code replayed; lineage revoked"
                );
                return Err(AuthError::invalid_grant(
                    "authorization code already consumed",
                ));
            }
        };

        if code.is_expired() {
            return Err(AuthError::invalid_grant("authorization code expired"));
        }
        if code.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "authorization code was issued to a different client",
            ));
        }
        if code.redirect_uri != redirect_uri {
            return Err(AuthError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }
        if let Some(ref challenge) = code.code_challenge {
            let verifier = request
                .code_verifier
                .as_deref()
                .ok_or_else(|| AuthError::invalid_grant("missing code_verifier parameter"))?;
            pkce::verify_challenge(challenge, verifier)?;
        }

        let issuance_id = Uuid::new_v4();
        let (access_token, access_record) = self
            .issuer
            .issue_access_token(
                client,
                code.grant_id,
                Some(&code.user_id),
                Some(&code.session_id),
                &code.scopes,
                issuance_id,
                Some(code.code_id),
            )
            .await?;

        let mut response = TokenResponse::new(
            access_token.clone(),
            self.issuer.policy().access_token_lifetime.as_secs(),
            join_scopes(&code.scopes),
        );

        if client.is_grant_type_allowed(GrantType::RefreshToken) {
            let refresh = self
                .issuer
                .issue_refresh_token(
                    client,
                    code.grant_id,
                    &code.user_id,
                    &code.scopes,
                    issuance_id,
                    Some(code.code_id),
                )
                .await?;
            response = response.with_refresh_token(refresh);
        }

        if code.scopes.contains("openid") {
            let id_token = self
                .issuer
                .issue_id_token(
                    client,
                    IdTokenContext {
                        user_id: &code.user_id,
                        session_id: Some(&code.session_id),
                        auth_time: None,
                        nonce: code.nonce.as_deref(),
                        claims_request: code.claims_request.as_ref(),
                        access_token: Some(&access_token),
                        code: None,
                    },
                )
                .await?;
            response = response.with_id_token(id_token);
        }

        self.sessions
            .record_participation(&code.session_id, &code.user_id, &client.client_id)
            .await?;

        debug!(client_id = %client.client_id, jti = %access_record.jti, "code redeemed");
        Ok(response)
    }

    /// Exchanges a refresh token for a new access token (and, per policy,
    /// a rotated refresh token).
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for unknown/expired/revoked/foreign tokens
    /// and `invalid_scope` when the requested scope exceeds the grant.
    pub async fn refresh(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> AuthResult<TokenResponse> {
        let plaintext = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_grant("missing refresh_token parameter"))?;

        let record = self
            .tokens
            .find_refresh_by_hash(&RefreshTokenRecord::hash_token(plaintext))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("unknown refresh token"))?;

        if record.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "refresh token was issued to a different client",
            ));
        }
        if !record.is_valid() {
            return Err(AuthError::invalid_grant("refresh token expired or revoked"));
        }
        let grant = self
            .grants
            .get_grant(record.grant_id)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("underlying grant no longer valid"))?;

        let scopes: BTreeSet<String> = match request.scope.as_deref() {
            Some(raw) => {
                let requested: BTreeSet<String> =
                    raw.split_whitespace().map(str::to_string).collect();
                if !requested.is_subset(&record.scopes) {
                    return Err(AuthError::invalid_scope(
                        "requested scope exceeds the original grant",
                    ));
                }
                requested
            }
            None => record.scopes.clone(),
        };

        let issuance_id = Uuid::new_v4();
        let (access_token, _) = self
            .issuer
            .issue_access_token(
                client,
                record.grant_id,
                Some(&record.user_id),
                Some(&grant.session_id),
                &scopes,
                issuance_id,
                record.code_id,
            )
            .await?;

        let mut response = TokenResponse::new(
            access_token.clone(),
            self.issuer.policy().access_token_lifetime.as_secs(),
            join_scopes(&scopes),
        );

        if self.issuer.policy().rotate_refresh_tokens {
            self.tokens.revoke_refresh(record.id).await?;
            let rotated = self
                .issuer
                .issue_refresh_token(
                    client,
                    record.grant_id,
                    &record.user_id,
                    &record.scopes,
                    issuance_id,
                    record.code_id,
                )
                .await?;
            response = response.with_refresh_token(rotated);
        } else {
            response = response.with_refresh_token(plaintext.to_string());
        }

        if scopes.contains("openid") {
            let id_token = self
                .issuer
                .issue_id_token(
                    client,
                    IdTokenContext {
                        user_id: &record.user_id,
                        session_id: Some(&grant.session_id),
                        auth_time: None,
                        nonce: None,
                        claims_request: None,
                        access_token: Some(&access_token),
                        code: None,
                    },
                )
                .await?;
            response = response.with_id_token(id_token);
        }

        Ok(response)
    }

    /// Handles the client_credentials grant: a user-less access token.
    ///
    /// # Errors
    ///
    /// Returns `unsupported_grant_type` when the client is not registered
    /// for it.
    pub async fn client_credentials(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> AuthResult<TokenResponse> {
        if !client.is_grant_type_allowed(GrantType::ClientCredentials) {
            return Err(AuthError::unsupported_grant_type("client_credentials"));
        }

        let requested: BTreeSet<String> = request
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let scopes = client.allowed_scopes(&requested);

        let (access_token, _) = self
            .issuer
            .issue_access_token(
                client,
                Uuid::new_v4(),
                None,
                None,
                &scopes,
                Uuid::new_v4(),
                None,
            )
            .await?;

        Ok(TokenResponse::new(
            access_token,
            self.issuer.policy().access_token_lifetime.as_secs(),
            join_scopes(&scopes),
        ))
    }

    /// Revokes a token (RFC 7009).
    ///
    /// Revoking a refresh token invalidates its whole grant lineage;
    /// revoking an access token also invalidates the sibling refresh token
    /// from the same issuance. Unknown or foreign tokens are a silent
    /// success, so callers cannot probe token existence.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage failures.
    pub async fn revoke(
        &self,
        request: &RevocationRequest,
        client: &Client,
    ) -> AuthResult<()> {
        let handled = match request.token_type_hint {
            Some(TokenTypeHint::RefreshToken) => {
                self.try_revoke_refresh(&request.token, client).await?
                    || self.try_revoke_access(&request.token, client).await?
            }
            Some(TokenTypeHint::AccessToken) => {
                self.try_revoke_access(&request.token, client).await?
                    || self.try_revoke_refresh(&request.token, client).await?
            }
            None => {
                self.try_revoke_refresh(&request.token, client).await?
                    || self.try_revoke_access(&request.token, client).await?
            }
        };
        if !handled {
            debug!(client_id = %client.client_id, "revocation of unknown token ignored");
        }
        Ok(())
    }

    async fn try_revoke_refresh(&self, token: &str, client: &Client) -> AuthResult<bool> {
        let Some(record) = self
            .tokens
            .find_refresh_by_hash(&RefreshTokenRecord::hash_token(token))
            .await?
        else {
            return Ok(false);
        };
        if record.client_id != client.client_id {
            return Ok(false);
        }

        self.tokens.revoke_refresh(record.id).await?;
        let revoked = self.tokens.revoke_grant_lineage(record.grant_id).await?;
        self.grants.invalidate_grant(record.grant_id).await?;
        debug!(
            client_id = %client.client_id,
            revoked,
            "refresh token revoked; grant lineage invalidated"
        );
        Ok(true)
    }

    async fn try_revoke_access(&self, token: &str, client: &Client) -> AuthResult<bool> {
        // An access token is one of our signed JWTs; anything that does
        // not verify is simply not an access token.
        let opts = VerifyOptions::default()
            .without_exp()
            .with_issuer(self.issuer.issuer());
        let Ok(claims) = verify_jws::<AccessTokenClaims>(
            token,
            SignatureAlgorithm::RS256,
            &VerificationKey::KeyPair(self.issuer.keys().rsa().as_ref()),
            &opts,
        ) else {
            return Ok(false);
        };

        let Some(record) = self.tokens.find_access(&claims.jti).await? else {
            return Ok(false);
        };
        if record.client_id != client.client_id {
            return Ok(false);
        }

        self.tokens.revoke_access(&record.jti).await?;
        let revoked = self.tokens.revoke_issuance(record.issuance_id).await?;
        debug!(
            client_id = %client.client_id,
            revoked,
            "access token revoked with its issuance siblings"
        );
        Ok(true)
    }

    /// Validates a bearer access token: signature, expiry, and synchronous
    /// revocation visibility.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` (401) on any failure.
    pub async fn validate_bearer(&self, token: &str) -> AuthResult<AccessTokenRecord> {
        let opts = VerifyOptions::default().with_issuer(self.issuer.issuer());
        let claims = verify_jws::<AccessTokenClaims>(
            token,
            SignatureAlgorithm::RS256,
            &VerificationKey::KeyPair(self.issuer.keys().rsa().as_ref()),
            &opts,
        )
        .map_err(|_| AuthError::invalid_token("bearer token verification failed"))?;

        let record = self
            .tokens
            .find_access(&claims.jti)
            .await?
            .ok_or_else(|| AuthError::invalid_token("unknown bearer token"))?;
        if !record.is_valid() {
            return Err(AuthError::invalid_token("bearer token expired or revoked"));
        }
        Ok(record)
    }

    /// Assembles the userinfo response for a bearer token: the subject per
    /// the client's subject type plus scope-filtered profile claims.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` for bad bearers and internal errors when
    /// the owning client vanished.
    pub async fn userinfo(
        &self,
        bearer: &str,
    ) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
        let record = self.validate_bearer(bearer).await?;
        let (claims, _) = self.userinfo_claims(&record).await?;
        Ok(claims)
    }

    /// Like [`Self::userinfo`], but honors a registered
    /// `userinfo_signed_response_alg` by returning a signed JWT instead of
    /// plain claims.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` for bad bearers and signing errors for
    /// unproducible algorithms.
    pub async fn userinfo_response(&self, bearer: &str) -> AuthResult<UserInfoReply> {
        let record = self.validate_bearer(bearer).await?;
        let (mut claims, client) = self.userinfo_claims(&record).await?;

        let Some(alg) = client.userinfo_signed_response_alg else {
            return Ok(UserInfoReply::Claims(claims));
        };

        // Signed userinfo carries iss and aud (OIDC Core Section 5.3.2).
        claims.insert(
            "iss".to_string(),
            serde_json::Value::String(self.issuer.issuer().to_string()),
        );
        claims.insert(
            "aud".to_string(),
            serde_json::Value::String(client.client_id.clone()),
        );

        let signed = if alg.is_symmetric() {
            let secret = client
                .client_secret
                .as_deref()
                .ok_or_else(|| AuthError::invalid_client("client has no secret for HS signing"))?;
            gatehouse_jose::sign_jws(
                &claims,
                &gatehouse_jose::SigningKey::Secret {
                    secret: secret.as_bytes(),
                    alg,
                },
            )?
        } else {
            gatehouse_jose::sign_jws(&claims, &self.issuer.keys().signing_key_for(alg)?)?
        };
        Ok(UserInfoReply::Jwt(signed))
    }

    /// Resolves the subject and profile claims for a validated token.
    async fn userinfo_claims(
        &self,
        record: &AccessTokenRecord,
    ) -> AuthResult<(serde_json::Map<String, serde_json::Value>, Client)> {
        let user_id = record
            .user_id
            .as_deref()
            .ok_or_else(|| AuthError::invalid_token("token has no end-user subject"))?;
        let client = self
            .clients
            .find_by_client_id(&record.client_id)
            .await?
            .ok_or_else(|| AuthError::internal("token's client no longer exists"))?;

        let sub = self.pairwise.resolve(user_id, &client).await?;
        let mut claims = self
            .authenticator
            .fetch_claims(user_id, &record.scopes)
            .await?;
        claims.insert("sub".to_string(), serde_json::Value::String(sub));
        Ok((claims, client))
    }
}

/// A userinfo response body: plain claims or a signed JWT, per the client's
/// registration.
#[derive(Debug, Clone)]
pub enum UserInfoReply {
    /// `application/json` claims.
    Claims(serde_json::Map<String, serde_json::Value>),

    /// `application/jwt` signed response.
    Jwt(String),
}
