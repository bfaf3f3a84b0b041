//! Registration request and response shapes.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use gatehouse_jose::{
    ContentEncryptionAlgorithm, Jwks, KeyManagementAlgorithm, SignatureAlgorithm,
};

use crate::types::{ApplicationType, GrantType, ResponseType, SubjectType, TokenEndpointAuthMethod};

/// A dynamic client registration request body.
///
/// Every field is optional; the validator supplies defaults and rejects
/// inconsistent combinations. Localized metadata variants
/// (`client_name#ja-JP`) arrive through the flattened `extra` map and are
/// folded in by the validator.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RegistrationRequest {
    /// Redirect URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,

    /// Response types the client wants to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types: Option<BTreeSet<ResponseType>>,

    /// Grant types the client explicitly requests (unioned with the
    /// response-type-implied set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<BTreeSet<GrantType>>,

    /// Application type; defaults to `web`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_type: Option<ApplicationType>,

    /// Subject type; defaults to `public`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<SubjectType>,

    /// Sector identifier URI for pairwise subjects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_identifier_uri: Option<String>,

    /// Token endpoint auth method; defaults to `client_secret_basic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<TokenEndpointAuthMethod>,

    /// Signing algorithm for client assertion JWTs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_signing_alg: Option<SignatureAlgorithm>,

    /// ID token signing algorithm; defaults to RS256. `none` is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<SignatureAlgorithm>,

    /// ID token encryption algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_alg: Option<KeyManagementAlgorithm>,

    /// ID token content encryption algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_enc: Option<ContentEncryptionAlgorithm>,

    /// Userinfo signing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<SignatureAlgorithm>,

    /// Request object signing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_object_signing_alg: Option<SignatureAlgorithm>,

    /// Request object encryption algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_object_encryption_alg: Option<KeyManagementAlgorithm>,

    /// Request object content encryption algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_object_encryption_enc: Option<ContentEncryptionAlgorithm>,

    /// Inline client JWKS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<Jwks>,

    /// Client JWKS URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Requested scope (space-separated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Software statement JWT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_statement: Option<String>,

    /// Software identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,

    /// Software version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,

    /// Front-channel logout URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontchannel_logout_uri: Option<String>,

    /// Post-logout redirect URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_logout_redirect_uris: Vec<String>,

    /// Requested PAR lifetime, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par_lifetime: Option<u64>,

    /// Everything else, including localized metadata variants like
    /// `client_name`, `client_name#ja-JP`, `logo_uri#fr-FR`, ...
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RegistrationRequest {
    /// Collects the localized variants for one metadata family
    /// (`client_name`, `logo_uri`, `policy_uri`, `tos_uri`) out of the
    /// flattened extras. Returns (locale tag, value) pairs; the untagged
    /// variant uses an empty tag.
    #[must_use]
    pub fn localized_values(&self, family: &str) -> Vec<(String, String)> {
        let mut values = Vec::new();
        for (key, value) in &self.extra {
            let Some(raw) = value.as_str() else { continue };
            if key == family {
                values.push((String::new(), raw.to_string()));
            } else if let Some(tag) = key.strip_prefix(family).and_then(|k| k.strip_prefix('#')) {
                values.push((tag.to_string(), raw.to_string()));
            }
        }
        values.sort();
        values
    }

    /// Requested scopes as a set.
    #[must_use]
    pub fn scope_set(&self) -> BTreeSet<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// A registration response: the effective client metadata plus the
/// management credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Issued client identifier.
    pub client_id: String,

    /// Issued secret, for confidential clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Unix timestamp of issuance.
    pub client_id_issued_at: i64,

    /// Unix timestamp of secret expiry; 0 means never.
    pub client_secret_expires_at: i64,

    /// Bearer credential for reading/updating/deleting this registration.
    pub registration_access_token: String,

    /// Per-client registration management URI.
    pub registration_client_uri: String,

    /// The full effective metadata, echoed as registered.
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
