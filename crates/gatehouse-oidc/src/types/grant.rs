//! Authorization grants and authorization codes.
//!
//! An [`AuthorizationGrant`] is the durable record of a user's scope
//! approval for a client within a session; it outlives any single code or
//! token. An [`AuthorizationCode`] is the single-use artifact that a client
//! redeems at the token endpoint; it is stored hashed, like refresh tokens.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::oauth::authorize::ClaimsRequest;

// =============================================================================
// Authorization Grant
// =============================================================================

/// The durable (client, user, session) scope approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// Grant identifier.
    pub grant_id: Uuid,

    /// The client the approval was given to.
    pub client_id: String,

    /// The approving resource owner.
    pub user_id: String,

    /// The authentication session the approval was given in.
    pub session_id: String,

    /// Scopes approved so far. Grows monotonically across re-authorizations.
    pub scopes: BTreeSet<String>,

    /// When the grant was first created.
    pub created_at: OffsetDateTime,
}

impl AuthorizationGrant {
    /// Creates a fresh grant for the given subject triple.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        scopes: BTreeSet<String>,
    ) -> Self {
        Self {
            grant_id: Uuid::new_v4(),
            client_id: client_id.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            scopes,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if every requested scope is already covered.
    #[must_use]
    pub fn covers(&self, requested: &BTreeSet<String>) -> bool {
        requested.is_subset(&self.scopes)
    }
}

// =============================================================================
// Authorization Code
// =============================================================================

/// A single-use, short-lived authorization code.
///
/// Stored hashed; the plaintext exists only in the redirect back to the
/// client. Redemption is atomic at the storage layer: exactly one redeemer
/// observes first use, every other observes a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Code identifier, used for token lineage on replay revocation.
    pub code_id: Uuid,

    /// SHA-256 hash of the plaintext code.
    pub code_hash: String,

    /// The client the code was issued to.
    pub client_id: String,

    /// The grant this code was issued under.
    pub grant_id: Uuid,

    /// The authenticated user.
    pub user_id: String,

    /// The authentication session.
    pub session_id: String,

    /// The redirect URI the code was bound to; redemption must match exactly.
    pub redirect_uri: String,

    /// The scopes this code can be exchanged for.
    pub scopes: BTreeSet<String>,

    /// OIDC nonce, echoed into the ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// PKCE code challenge (S256), when the client bound one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// Claim requests carried from the authorization request, applied when
    /// issuing the ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims_request: Option<ClaimsRequest>,

    /// When the code was issued.
    pub created_at: OffsetDateTime,

    /// When the code expires.
    pub expires_at: OffsetDateTime,

    /// When the code was consumed, if it has been.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<OffsetDateTime>,
}

impl AuthorizationCode {
    /// Generates a fresh plaintext code: 32 random bytes, base64url.
    #[must_use]
    pub fn generate_code() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Hashes a plaintext code for storage and lookup.
    #[must_use]
    pub fn hash_code(code: &str) -> String {
        hex::encode(Sha256::digest(code.as_bytes()))
    }

    /// Returns `true` if the code has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if the code has been consumed.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
