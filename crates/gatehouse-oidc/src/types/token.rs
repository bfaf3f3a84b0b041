//! Access and refresh token records.
//!
//! Both records carry lineage pointers for cascading revocation: the grant
//! they belong to, the issuance event that produced them (siblings share
//! one), and the authorization code they came from, if any. Revocation
//! traverses these owner pointers rather than a general graph.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Access Token Record
// =============================================================================

/// Server-side record of an issued access token, keyed by `jti`.
///
/// The token itself is a signed JWT; this record exists so revocation is
/// synchronously visible to the next bearer-token validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    /// JWT ID of the issued token.
    pub jti: String,

    /// The client the token was issued to.
    pub client_id: String,

    /// The grant lineage this token belongs to.
    pub grant_id: Uuid,

    /// The resource owner, absent for client-credentials tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// The authentication session, when user-bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Scopes carried by the token.
    pub scopes: BTreeSet<String>,

    /// Issuance event shared with sibling tokens from the same response.
    pub issuance_id: Uuid,

    /// The authorization code this token was redeemed from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_id: Option<Uuid>,

    /// When the token was issued.
    pub issued_at: OffsetDateTime,

    /// When the token expires.
    pub expires_at: OffsetDateTime,

    /// When the token was revoked, if it has been.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl AccessTokenRecord {
    /// Returns `true` if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if the token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Returns `true` if the token is neither expired nor revoked.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }
}

// =============================================================================
// Refresh Token Record
// =============================================================================

/// Server-side record of an issued refresh token.
///
/// The plaintext token is opaque and random; only its hash is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Record identifier.
    pub id: Uuid,

    /// SHA-256 hash of the plaintext token.
    pub token_hash: String,

    /// The client the token was issued to.
    pub client_id: String,

    /// The resource owner.
    pub user_id: String,

    /// The grant lineage this token belongs to.
    pub grant_id: Uuid,

    /// Scopes exchangeable through this token.
    pub scopes: BTreeSet<String>,

    /// Issuance event shared with sibling tokens from the same response.
    pub issuance_id: Uuid,

    /// The authorization code this token was redeemed from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_id: Option<Uuid>,

    /// When the token was issued.
    pub created_at: OffsetDateTime,

    /// When the token expires; `None` means it never expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<OffsetDateTime>,

    /// When the token was revoked, if it has been.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl RefreshTokenRecord {
    /// Generates a fresh plaintext refresh token: 48 random bytes, base64url.
    #[must_use]
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 48];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Hashes a plaintext token for storage and lookup.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Returns `true` if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| OffsetDateTime::now_utc() > at)
    }

    /// Returns `true` if the token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Returns `true` if the token is neither expired nor revoked.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn make_access() -> AccessTokenRecord {
        let now = OffsetDateTime::now_utc();
        AccessTokenRecord {
            jti: Uuid::new_v4().to_string(),
            client_id: "client-1".to_string(),
            grant_id: Uuid::new_v4(),
            user_id: Some("user-1".to_string()),
            session_id: Some("session-1".to_string()),
            scopes: BTreeSet::from(["openid".to_string()]),
            issuance_id: Uuid::new_v4(),
            code_id: None,
            issued_at: now,
            expires_at: now + Duration::hours(1),
            revoked_at: None,
        }
    }

    fn make_refresh() -> RefreshTokenRecord {
        let now = OffsetDateTime::now_utc();
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: RefreshTokenRecord::hash_token("token"),
            client_id: "client-1".to_string(),
            user_id: "user-1".to_string(),
            grant_id: Uuid::new_v4(),
            scopes: BTreeSet::from(["openid".to_string()]),
            issuance_id: Uuid::new_v4(),
            code_id: None,
            created_at: now,
            expires_at: Some(now + Duration::days(90)),
            revoked_at: None,
        }
    }

    #[test]
    fn test_access_token_validity() {
        let mut record = make_access();
        assert!(record.is_valid());

        record.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(record.is_revoked());
        assert!(!record.is_valid());

        let mut expired = make_access();
        expired.expires_at = OffsetDateTime::now_utc() - Duration::seconds(5);
        assert!(expired.is_expired());
        assert!(!expired.is_valid());
    }

    #[test]
    fn test_refresh_token_validity() {
        let mut record = make_refresh();
        assert!(record.is_valid());

        record.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!record.is_valid());

        let mut unexpiring = make_refresh();
        unexpiring.expires_at = None;
        assert!(!unexpiring.is_expired());
        assert!(unexpiring.is_valid());
    }

    #[test]
    fn test_refresh_token_generation() {
        let token = RefreshTokenRecord::generate_token();
        // 48 bytes -> 64 base64url chars.
        assert_eq!(token.len(), 64);
        assert_ne!(token, RefreshTokenRecord::generate_token());
    }

    #[test]
    fn test_refresh_token_hash_stable() {
        let token = RefreshTokenRecord::generate_token();
        assert_eq!(
            RefreshTokenRecord::hash_token(&token),
            RefreshTokenRecord::hash_token(&token)
        );
        // Hex SHA-256 digest.
        assert_eq!(RefreshTokenRecord::hash_token(&token).len(), 64);
    }
}
