//! Algorithm capability enums.
//!
//! Every JOSE operation in this crate dispatches on one of these enums. Each
//! variant knows its wire name and per-algorithm parameters, so callers never
//! branch on string identifiers and adding an algorithm stays additive.

use std::fmt;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::JoseError;

// =============================================================================
// Signature Algorithms
// =============================================================================

/// JWS signature algorithms (RFC 7518 Section 3.1).
///
/// `ES512` is accepted as a registered name but the signing backend carries
/// no P-521 support, so sign/verify return [`JoseError::UnsupportedAlgorithm`]
/// for it. `None` verifies only when the caller explicitly allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    RS512,
    /// ECDSA P-256 with SHA-256.
    ES256,
    /// ECDSA P-384 with SHA-384.
    ES384,
    /// ECDSA P-521 with SHA-512 (registered but unsupported by the backend).
    ES512,
    /// RSASSA-PSS with SHA-256.
    PS256,
    /// RSASSA-PSS with SHA-384.
    PS384,
    /// RSASSA-PSS with SHA-512.
    PS512,
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// Unsecured JWS (no signature).
    #[serde(rename = "none")]
    None,
}

impl SignatureAlgorithm {
    /// All algorithms this build can actually sign and verify with.
    pub const SUPPORTED: &'static [SignatureAlgorithm] = &[
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::ES256,
        Self::ES384,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::HS256,
        Self::HS384,
        Self::HS512,
    ];

    /// Returns the RFC 7518 wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::None => "none",
        }
    }

    /// Parses an RFC 7518 wire name.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::UnsupportedAlgorithm`] for unknown names.
    pub fn parse(s: &str) -> Result<Self, JoseError> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            "ES512" => Ok(Self::ES512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "none" => Ok(Self::None),
            other => Err(JoseError::unsupported(other)),
        }
    }

    /// Maps to the backend algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::UnsupportedAlgorithm`] for `ES512` (no P-521
    /// backend) and `none` (handled outside the backend).
    pub fn to_jwt_algorithm(self) -> Result<Algorithm, JoseError> {
        match self {
            Self::RS256 => Ok(Algorithm::RS256),
            Self::RS384 => Ok(Algorithm::RS384),
            Self::RS512 => Ok(Algorithm::RS512),
            Self::ES256 => Ok(Algorithm::ES256),
            Self::ES384 => Ok(Algorithm::ES384),
            Self::PS256 => Ok(Algorithm::PS256),
            Self::PS384 => Ok(Algorithm::PS384),
            Self::PS512 => Ok(Algorithm::PS512),
            Self::HS256 => Ok(Algorithm::HS256),
            Self::HS384 => Ok(Algorithm::HS384),
            Self::HS512 => Ok(Algorithm::HS512),
            Self::ES512 | Self::None => Err(JoseError::unsupported(self.as_str())),
        }
    }

    /// Returns `true` for the RSASSA families (RS and PS).
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            Self::RS256 | Self::RS384 | Self::RS512 | Self::PS256 | Self::PS384 | Self::PS512
        )
    }

    /// Returns `true` for the ECDSA family.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES256 | Self::ES384 | Self::ES512)
    }

    /// Returns `true` for the HMAC family (key derived from the client secret).
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// SHA-2 digest strength in bits, used for `at_hash`/`c_hash` and
    /// secret-derived keys. Zero for `none`.
    #[must_use]
    pub fn hash_bits(&self) -> usize {
        match self {
            Self::RS256 | Self::ES256 | Self::PS256 | Self::HS256 => 256,
            Self::RS384 | Self::ES384 | Self::PS384 | Self::HS384 => 384,
            Self::RS512 | Self::ES512 | Self::PS512 | Self::HS512 => 512,
            Self::None => 0,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Key Management Algorithms (JWE)
// =============================================================================

/// JWE key management algorithms (RFC 7518 Section 4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyManagementAlgorithm {
    /// RSAES-PKCS1-v1_5 key transport.
    #[serde(rename = "RSA1_5")]
    Rsa1_5,
    /// RSAES-OAEP key transport (SHA-1 per RFC 7518).
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,
    /// RSAES-OAEP key transport with SHA-256.
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,
    /// AES-128 key wrap.
    #[serde(rename = "A128KW")]
    A128Kw,
    /// AES-192 key wrap.
    #[serde(rename = "A192KW")]
    A192Kw,
    /// AES-256 key wrap.
    #[serde(rename = "A256KW")]
    A256Kw,
}

impl KeyManagementAlgorithm {
    /// Returns the RFC 7518 wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa1_5 => "RSA1_5",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::A128Kw => "A128KW",
            Self::A192Kw => "A192KW",
            Self::A256Kw => "A256KW",
        }
    }

    /// Parses an RFC 7518 wire name.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::UnsupportedAlgorithm`] for unknown names.
    pub fn parse(s: &str) -> Result<Self, JoseError> {
        match s {
            "RSA1_5" => Ok(Self::Rsa1_5),
            "RSA-OAEP" => Ok(Self::RsaOaep),
            "RSA-OAEP-256" => Ok(Self::RsaOaep256),
            "A128KW" => Ok(Self::A128Kw),
            "A192KW" => Ok(Self::A192Kw),
            "A256KW" => Ok(Self::A256Kw),
            other => Err(JoseError::unsupported(other)),
        }
    }

    /// Returns `true` for RSA key transport algorithms.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256)
    }

    /// Key-encryption-key size in bytes for the AES key wrap variants.
    /// Zero for RSA transport (no KEK).
    #[must_use]
    pub fn kek_len(&self) -> usize {
        match self {
            Self::A128Kw => 16,
            Self::A192Kw => 24,
            Self::A256Kw => 32,
            _ => 0,
        }
    }
}

impl fmt::Display for KeyManagementAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Content Encryption Algorithms (JWE)
// =============================================================================

/// JWE content encryption algorithms (RFC 7518 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentEncryptionAlgorithm {
    /// AES-128 GCM.
    #[serde(rename = "A128GCM")]
    A128Gcm,
    /// AES-192 GCM.
    #[serde(rename = "A192GCM")]
    A192Gcm,
    /// AES-256 GCM.
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

impl ContentEncryptionAlgorithm {
    /// Returns the RFC 7518 wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Parses an RFC 7518 wire name.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::UnsupportedAlgorithm`] for unknown names.
    pub fn parse(s: &str) -> Result<Self, JoseError> {
        match s {
            "A128GCM" => Ok(Self::A128Gcm),
            "A192GCM" => Ok(Self::A192Gcm),
            "A256GCM" => Ok(Self::A256Gcm),
            other => Err(JoseError::unsupported(other)),
        }
    }

    /// Content-encryption-key size in bytes.
    #[must_use]
    pub fn key_len(&self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
        }
    }
}

impl fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
