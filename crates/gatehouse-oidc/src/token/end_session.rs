//! End-session (RP-initiated logout).
//!
//! Given a valid ID token hint, the session it names is invalidated and
//! the front-channel logout URI of every client that obtained tokens in
//! that session is collected, each decorated with `iss` and `sid` so the
//! relying party can validate the logout call.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use gatehouse_jose::{SignatureAlgorithm, VerificationKey, VerifyOptions, peek_header, verify_jws};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{ClientStorage, SessionStorage};
use crate::token::issuer::{IdTokenClaims, KeyRing};
use crate::types::Client;

/// End-session request parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct EndSessionRequest {
    /// The ID token previously issued to the relying party.
    pub id_token_hint: String,

    /// Where to send the user agent afterwards; must be registered.
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,

    /// Opaque state echoed onto the post-logout redirect.
    #[serde(default)]
    pub state: Option<String>,
}

/// The outcome of an end-session request.
#[derive(Debug, Clone)]
pub struct EndSessionResult {
    /// Front-channel logout URIs for every relying party in the session,
    /// each carrying `iss` and `sid`.
    pub frontchannel_logout_uris: Vec<String>,

    /// The validated post-logout redirect, with `state` attached.
    pub post_logout_redirect_uri: Option<String>,
}

/// Session termination service.
pub struct EndSessionService {
    issuer: String,
    keys: Arc<KeyRing>,
    clients: Arc<dyn ClientStorage>,
    sessions: Arc<dyn SessionStorage>,
}

impl EndSessionService {
    /// Creates a new end-session service.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        keys: Arc<KeyRing>,
        clients: Arc<dyn ClientStorage>,
        sessions: Arc<dyn SessionStorage>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
            clients,
            sessions,
        }
    }

    /// Ends the session named by the ID token hint.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` when the hint does not verify, names no
    /// session, or the post-logout redirect is unregistered.
    pub async fn end_session(&self, request: &EndSessionRequest) -> AuthResult<EndSessionResult> {
        let (claims, client) = self.verify_hint(&request.id_token_hint).await?;
        let session_id = claims
            .sid
            .ok_or_else(|| AuthError::invalid_request("id_token_hint carries no session"))?;

        let post_logout_redirect_uri = match &request.post_logout_redirect_uri {
            None => None,
            Some(uri) => {
                if !client.is_post_logout_redirect_uri_allowed(uri) {
                    return Err(AuthError::invalid_request(
                        "post_logout_redirect_uri is not registered",
                    ));
                }
                let mut url = Url::parse(uri)
                    .map_err(|_| AuthError::invalid_request("post_logout_redirect_uri is not a URL"))?;
                if let Some(ref state) = request.state {
                    url.query_pairs_mut().append_pair("state", state);
                }
                Some(url.to_string())
            }
        };

        let participants = self.sessions.end_session(&session_id).await?;
        debug!(session_id, participants = participants.len(), "session ended");

        let mut frontchannel_logout_uris = Vec::new();
        for client_id in participants {
            let Some(participant) = self.clients.find_by_client_id(&client_id).await? else {
                continue;
            };
            let Some(ref logout_uri) = participant.frontchannel_logout_uri else {
                continue;
            };
            if let Ok(mut url) = Url::parse(logout_uri) {
                url.query_pairs_mut()
                    .append_pair("iss", &self.issuer)
                    .append_pair("sid", &session_id);
                frontchannel_logout_uris.push(url.to_string());
            }
        }

        Ok(EndSessionResult {
            frontchannel_logout_uris,
            post_logout_redirect_uri,
        })
    }

    /// Verifies the ID token hint under the algorithm it was issued with,
    /// expiry excluded (logout legitimately happens after expiry).
    async fn verify_hint(&self, hint: &str) -> AuthResult<(IdTokenClaims, Client)> {
        let header = peek_header(hint)
            .map_err(|_| AuthError::invalid_request("id_token_hint is not a JWT"))?;
        let alg = SignatureAlgorithm::parse(&header.alg)
            .map_err(|_| AuthError::invalid_request("id_token_hint algorithm is unknown"))?;

        // The audience names the client whose registration drives
        // verification.
        let aud = unverified_audience(hint)?;
        let client = self
            .clients
            .find_by_client_id(&aud)
            .await?
            .ok_or_else(|| AuthError::invalid_request("id_token_hint audience is unknown"))?;
        if alg != client.id_token_signed_response_alg {
            return Err(AuthError::invalid_request(
                "id_token_hint algorithm does not match the registration",
            ));
        }

        let opts = VerifyOptions::default()
            .without_exp()
            .with_issuer(&self.issuer);
        let claims = if alg.is_symmetric() {
            let secret = client
                .client_secret
                .as_deref()
                .ok_or_else(|| AuthError::invalid_request("client has no secret"))?;
            verify_jws::<IdTokenClaims>(
                hint,
                alg,
                &VerificationKey::Secret(secret.as_bytes()),
                &opts,
            )
        } else if alg.is_rsa() {
            verify_jws::<IdTokenClaims>(
                hint,
                alg,
                &VerificationKey::KeyPair(self.keys.rsa().as_ref()),
                &opts,
            )
        } else {
            // The only EC algorithm this server signs with.
            verify_jws::<IdTokenClaims>(
                hint,
                alg,
                &VerificationKey::Jwks(&self.keys.jwks()),
                &opts,
            )
        }
        .map_err(|_| AuthError::invalid_request("id_token_hint verification failed"))?;

        Ok((claims, client))
    }
}

fn unverified_audience(token: &str) -> AuthResult<String> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::invalid_request("id_token_hint is not a JWT"))?;
    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::invalid_request("id_token_hint payload is not base64url"))?;
    let value: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|_| AuthError::invalid_request("id_token_hint payload is not JSON"))?;
    match value.get("aud") {
        Some(serde_json::Value::String(aud)) => Ok(aud.clone()),
        Some(serde_json::Value::Array(arr)) => arr
            .first()
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AuthError::invalid_request("id_token_hint has an empty audience")),
        _ => Err(AuthError::invalid_request("id_token_hint has no audience")),
    }
}

// =============================================================================
// Tests
// =============================================================================
