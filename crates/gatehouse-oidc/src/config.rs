//! Authorization server configuration.
//!
//! Typed configuration for the protocol engine, organized into sections.
//! Loading from files is the embedding application's concern; this module
//! only defines the shapes and their defaults.
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer = "https://auth.example.com"
//!
//! [tokens]
//! access_token_lifetime = "1h"
//! refresh_token_lifetime = "90d"
//! authorization_code_lifetime = "10m"
//!
//! [pairwise]
//! id_type = "algorithmic"
//! salt = "change-me"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use gatehouse_jose::Jwks;

/// Root configuration for the authorization server engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Issuer URL (used in token `iss` claims and registration client URIs).
    pub issuer: String,

    /// Token lifetime and rotation policy.
    pub tokens: TokenPolicy,

    /// Pairwise subject identifier configuration.
    pub pairwise: PairwiseConfig,

    /// Dynamic client registration policy.
    pub registration: RegistrationPolicy,

    /// Request object processing policy.
    pub request_objects: RequestObjectPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            issuer: "https://localhost:8443".to_string(),
            tokens: TokenPolicy::default(),
            pairwise: PairwiseConfig::default(),
            registration: RegistrationPolicy::default(),
            request_objects: RequestObjectPolicy::default(),
        }
    }
}

/// Token lifetime and rotation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenPolicy {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Whether to rotate refresh tokens on use.
    /// When true, the old token is revoked and a new one is issued.
    pub rotate_refresh_tokens: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600),
            refresh_token_lifetime: Duration::from_secs(90 * 24 * 3600),
            id_token_lifetime: Duration::from_secs(3600),
            authorization_code_lifetime: Duration::from_secs(600),
            rotate_refresh_tokens: true,
        }
    }
}

/// How pairwise subject identifiers are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairwiseIdType {
    /// Derived from a keyed hash on every call; nothing is stored.
    Algorithmic,
    /// Computed once, then persisted and reused.
    Persistent,
}

/// Pairwise subject identifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PairwiseConfig {
    /// Derivation mode.
    pub id_type: PairwiseIdType,

    /// Server-wide secret salt keying the derivation. Must be identical
    /// across all nodes of a deployment.
    pub salt: String,
}

impl Default for PairwiseConfig {
    fn default() -> Self {
        Self {
            id_type: PairwiseIdType::Algorithmic,
            salt: String::new(),
        }
    }
}

/// Dynamic client registration policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationPolicy {
    /// Timeout for fetching `sector_identifier_uri` documents and client
    /// JWKS documents.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// JWKS trusted to verify software statements that do not embed their
    /// own `jwks_uri`.
    pub trusted_software_jwks: Option<Jwks>,

    /// Default lifetime echoed as `par_lifetime` for clients that do not
    /// request one, in seconds.
    pub default_par_lifetime: u64,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            trusted_software_jwks: None,
            default_par_lifetime: 600,
        }
    }
}

/// Request object processing policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestObjectPolicy {
    /// Whether `alg=none` request objects are accepted.
    pub allow_unsigned: bool,
}

impl Default for RequestObjectPolicy {
    fn default() -> Self {
        Self {
            allow_unsigned: false,
        }
    }
}
