//! OAuth 2.0 / OIDC client domain types.
//!
//! This module defines the `Client` record produced by dynamic registration
//! and consumed by every other component, plus the enums for the metadata
//! values OIDC registration negotiates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use gatehouse_jose::{
    ContentEncryptionAlgorithm, Jwks, KeyManagementAlgorithm, SignatureAlgorithm,
};

// =============================================================================
// Metadata enums
// =============================================================================

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Client Credentials flow (confidential clients only).
    ClientCredentials,
    /// Implicit flow (tokens issued directly from the authorization endpoint).
    Implicit,
    /// Refresh Token flow.
    RefreshToken,
}

impl GrantType {
    /// Returns the OAuth 2.0 `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Implicit => "implicit",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Individual OAuth 2.0 / OIDC response type values.
///
/// An authorization request carries a space-separated set of these
/// (e.g. `code id_token` for the hybrid flow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Authorization code.
    Code,
    /// ID token (implicit).
    IdToken,
    /// Access token (implicit).
    Token,
}

impl ResponseType {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
            Self::IdToken => "id_token",
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// OIDC application types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// Server-based or browser-based application; https redirect URIs.
    Web,
    /// Installed application; custom-scheme redirect URIs permitted.
    Native,
}

/// OIDC subject identifier types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// The same subject for a user across all clients.
    Public,
    /// A per-sector subject preventing cross-client correlation.
    Pairwise,
}

/// Token endpoint authentication methods (OIDC Core Section 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// No client authentication (public clients).
    None,
    /// Client secret via HTTP Basic Auth.
    ClientSecretBasic,
    /// Client secret in the request body.
    ClientSecretPost,
    /// Client assertion JWT signed with the client secret (HS family).
    ClientSecretJwt,
    /// Client assertion JWT signed with the client's private key.
    PrivateKeyJwt,
}

impl TokenEndpointAuthMethod {
    /// Returns the registered method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::ClientSecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
        }
    }

    /// Returns `true` if this method requires the client to hold a secret.
    #[must_use]
    pub fn requires_secret(&self) -> bool {
        matches!(
            self,
            Self::ClientSecretBasic | Self::ClientSecretPost | Self::ClientSecretJwt
        )
    }
}

impl std::fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Localized metadata
// =============================================================================

/// A human-facing metadata value with optional per-locale variants
/// (`client_name`, `client_name#ja-JP`, ...).
///
/// The empty tag holds the untagged default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedValue(pub BTreeMap<String, String>);

impl LocalizedValue {
    /// Creates a value with only an untagged default.
    #[must_use]
    pub fn plain(value: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(String::new(), value.into());
        Self(map)
    }

    /// Sets the variant for a locale tag (empty tag = default).
    pub fn set(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.0.insert(tag.into(), value.into());
    }

    /// Looks up the variant for a tag, falling back to the default.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0
            .get(tag)
            .or_else(|| self.0.get(""))
            .map(String::as_str)
    }

    /// Returns `true` if no variant is present at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth 2.0 / OIDC client.
///
/// Created only by the registration validator; mutated only through
/// authenticated registration updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier used in protocol flows.
    pub client_id: String,

    /// Client secret. Absent for public clients. Stored as issued so that
    /// HS-family signatures and symmetric JWE keys can be derived from it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Registration timestamp (`client_id_issued_at`).
    pub client_id_issued_at: OffsetDateTime,

    /// Secret expiry as a unix timestamp; `0` means the secret never expires.
    pub client_secret_expires_at: i64,

    /// OIDC application type.
    pub application_type: ApplicationType,

    /// Subject identifier type.
    pub subject_type: SubjectType,

    /// Explicit sector identifier URI for pairwise subjects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_identifier_uri: Option<String>,

    /// Registered redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Response types the client may request.
    #[serde(default)]
    pub response_types: BTreeSet<ResponseType>,

    /// Grant types the client may use (implied from response types, unioned
    /// with any explicitly requested set).
    #[serde(default)]
    pub grant_types: BTreeSet<GrantType>,

    /// Token endpoint authentication method.
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Signing algorithm for `client_secret_jwt`/`private_key_jwt`
    /// assertions, when pinned at registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_signing_alg: Option<SignatureAlgorithm>,

    /// ID token signing algorithm. `none` is never permitted here.
    pub id_token_signed_response_alg: SignatureAlgorithm,

    /// ID token encryption algorithm, when the client opted into encrypted
    /// ID tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_alg: Option<KeyManagementAlgorithm>,

    /// ID token content encryption algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_enc: Option<ContentEncryptionAlgorithm>,

    /// Userinfo response signing algorithm, when registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<SignatureAlgorithm>,

    /// Required signing algorithm for request objects, when registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_signing_alg: Option<SignatureAlgorithm>,

    /// Accepted encryption algorithm for request objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_encryption_alg: Option<KeyManagementAlgorithm>,

    /// Accepted content encryption algorithm for request objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_encryption_enc: Option<ContentEncryptionAlgorithm>,

    /// Inline JWKS holding the client's public keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<Jwks>,

    /// URI from which the client's JWKS can be fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Scopes the client may request. Empty means the client may request
    /// any scope.
    #[serde(default)]
    pub scopes: BTreeSet<String>,

    /// Software statement JWT supplied at registration, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_statement: Option<String>,

    /// Software identifier asserted by the statement or the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,

    /// Software version asserted by the statement or the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,

    /// Bearer credential for per-client registration management.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,

    /// Lifetime of pushed authorization requests for this client, seconds.
    pub par_lifetime: u64,

    /// Front-channel logout URI invoked at end-session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontchannel_logout_uri: Option<String>,

    /// Allowed post-logout redirect URIs.
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,

    /// Localized display name.
    #[serde(default, skip_serializing_if = "LocalizedValue::is_empty")]
    pub client_name: LocalizedValue,

    /// Localized logo URI.
    #[serde(default, skip_serializing_if = "LocalizedValue::is_empty")]
    pub logo_uri: LocalizedValue,

    /// Localized policy URI.
    #[serde(default, skip_serializing_if = "LocalizedValue::is_empty")]
    pub policy_uri: LocalizedValue,

    /// Localized terms-of-service URI.
    #[serde(default, skip_serializing_if = "LocalizedValue::is_empty")]
    pub tos_uri: LocalizedValue,

    /// Pre-authorized clients skip the consent step entirely.
    #[serde(default)]
    pub trusted: bool,
}

impl Client {
    /// Validates the invariants every persisted client must hold.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.id_token_signed_response_alg == SignatureAlgorithm::None {
            return Err(ClientValidationError::UnsignedIdToken);
        }

        // Any redirection-based response type requires registered redirect URIs.
        if !self.response_types.is_empty() && self.redirect_uris.is_empty() {
            return Err(ClientValidationError::NoRedirectUris);
        }

        if self.token_endpoint_auth_method.requires_secret() && self.client_secret.is_none() {
            return Err(ClientValidationError::MissingSecret);
        }

        if self.subject_type == SubjectType::Pairwise
            && self.sector_identifier_uri.is_none()
            && self.redirect_hosts().len() != 1
        {
            return Err(ClientValidationError::AmbiguousSector);
        }

        Ok(())
    }

    /// Checks if the given redirect URI exactly matches a registered one.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks if the given post-logout redirect URI is registered.
    ///
    /// The comparison ignores query parameters so registered URIs still
    /// match when the relying party appends state.
    #[must_use]
    pub fn is_post_logout_redirect_uri_allowed(&self, uri: &str) -> bool {
        let uri_without_query = uri.split('?').next().unwrap_or(uri);
        self.post_logout_redirect_uris.iter().any(|allowed| {
            let allowed_without_query = allowed.split('?').next().unwrap_or(allowed);
            allowed_without_query == uri_without_query
        })
    }

    /// Checks if the requested response type set is within the registered
    /// set. A client registered with no response types is treated as
    /// code-only by convention.
    #[must_use]
    pub fn allows_response_types(&self, requested: &BTreeSet<ResponseType>) -> bool {
        if self.response_types.is_empty() {
            return requested.iter().all(|rt| *rt == ResponseType::Code);
        }
        requested.is_subset(&self.response_types)
    }

    /// Checks if the given grant type is allowed for this client.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Intersects requested scopes with the registered scope set. An empty
    /// registered set places no restriction.
    #[must_use]
    pub fn allowed_scopes(&self, requested: &BTreeSet<String>) -> BTreeSet<String> {
        if self.scopes.is_empty() {
            requested.clone()
        } else {
            requested.intersection(&self.scopes).cloned().collect()
        }
    }

    /// The set of distinct hostnames across the registered redirect URIs.
    #[must_use]
    pub fn redirect_hosts(&self) -> BTreeSet<String> {
        self.redirect_uris
            .iter()
            .filter_map(|uri| Url::parse(uri).ok())
            .filter_map(|url| url.host_str().map(str::to_string))
            .collect()
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Errors that can occur during client invariant validation.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// ID tokens must always be signed.
    #[error("id_token_signed_response_alg must not be none")]
    UnsignedIdToken,

    /// Redirection-based response types require redirect URIs.
    #[error("Redirection-based response types require redirect URIs")]
    NoRedirectUris,

    /// The chosen token endpoint auth method requires a client secret.
    #[error("Token endpoint auth method requires a client secret")]
    MissingSecret,

    /// Pairwise subjects require an unambiguous sector.
    #[error("Pairwise subject type requires a sector identifier or a single redirect host")]
    AmbiguousSector,
}

// =============================================================================
// Tests
// =============================================================================

/// A baseline confidential web client for unit tests across the crate.
#[cfg(test)]
pub(crate) fn make_web_client() -> Client {
    Client {
        client_id: "test-client".to_string(),
        client_secret: Some("secret-value".to_string()),
        client_id_issued_at: OffsetDateTime::now_utc(),
        client_secret_expires_at: 0,
        application_type: ApplicationType::Web,
        subject_type: SubjectType::Public,
        sector_identifier_uri: None,
        redirect_uris: vec!["https://app.example.com/callback".to_string()],
        response_types: BTreeSet::from([ResponseType::Code]),
        grant_types: BTreeSet::from([GrantType::AuthorizationCode, GrantType::RefreshToken]),
        token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
        token_endpoint_auth_signing_alg: None,
        id_token_signed_response_alg: SignatureAlgorithm::RS256,
        id_token_encrypted_response_alg: None,
        id_token_encrypted_response_enc: None,
        userinfo_signed_response_alg: None,
        request_object_signing_alg: None,
        request_object_encryption_alg: None,
        request_object_encryption_enc: None,
        jwks: None,
        jwks_uri: None,
        scopes: BTreeSet::from(["openid".to_string(), "profile".to_string()]),
        software_statement: None,
        software_id: None,
        software_version: None,
        registration_access_token: Some("reg-token".to_string()),
        par_lifetime: 600,
        frontchannel_logout_uri: None,
        post_logout_redirect_uris: vec!["https://app.example.com/bye".to_string()],
        client_name: LocalizedValue::plain("Test App"),
        logo_uri: LocalizedValue::default(),
        policy_uri: LocalizedValue::default(),
        tos_uri: LocalizedValue::default(),
        trusted: false,
    }
}
