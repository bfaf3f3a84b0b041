//! JWK/JWKS types and signing key pairs.
//!
//! The server signs with a [`SigningKeyPair`] (RSA 2048 or P-384) and
//! publishes the public half as a JWK. Client-registered JWKS documents are
//! modeled with the same [`Jwk`] type; fields clients commonly omit
//! (`kid`, `use`, `alg`) are optional there.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::EncodePrivateKey as EcEncodePrivateKey;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::alg::SignatureAlgorithm;
use crate::error::JoseError;

// =============================================================================
// JWKS Types
// =============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Creates a new empty JWKS.
    #[must_use]
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Adds a key to the set.
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// Finds a key by key id.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Returns every key of the given key type (`"RSA"`, `"EC"`, `"oct"`).
    pub fn of_type<'a>(&'a self, kty: &'a str) -> impl Iterator<Item = &'a Jwk> {
        self.keys.iter().filter(move |k| k.kty == kty)
    }
}

impl Default for Jwks {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID. Optional in client-supplied key sets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    // RSA-specific fields
    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC-specific fields
    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Builds a verification key from this JWK.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::InvalidKey`] if the key type is unknown or the
    /// required components are missing.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, JoseError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_deref()
                    .ok_or_else(|| JoseError::invalid_key("RSA JWK missing n"))?;
                let e = self
                    .e
                    .as_deref()
                    .ok_or_else(|| JoseError::invalid_key("RSA JWK missing e"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|err| JoseError::invalid_key(err.to_string()))
            }
            "EC" => {
                let x = self
                    .x
                    .as_deref()
                    .ok_or_else(|| JoseError::invalid_key("EC JWK missing x"))?;
                let y = self
                    .y
                    .as_deref()
                    .ok_or_else(|| JoseError::invalid_key("EC JWK missing y"))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|err| JoseError::invalid_key(err.to_string()))
            }
            other => Err(JoseError::invalid_key(format!(
                "unsupported key type {other}"
            ))),
        }
    }

    /// Reconstructs an RSA public key from this JWK, for JWE key transport.
    ///
    /// # Errors
    ///
    /// Returns [`JoseError::InvalidKey`] if this is not a well-formed RSA key.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, JoseError> {
        if self.kty != "RSA" {
            return Err(JoseError::invalid_key(format!(
                "expected RSA key, got {}",
                self.kty
            )));
        }
        let n = self
            .n
            .as_deref()
            .ok_or_else(|| JoseError::invalid_key("RSA JWK missing n"))?;
        let e = self
            .e
            .as_deref()
            .ok_or_else(|| JoseError::invalid_key("RSA JWK missing e"))?;
        let n = URL_SAFE_NO_PAD
            .decode(n)
            .map_err(|_| JoseError::invalid_key("RSA JWK n is not base64url"))?;
        let e = URL_SAFE_NO_PAD
            .decode(e)
            .map_err(|_| JoseError::invalid_key("RSA JWK e is not base64url"))?;
        RsaPublicKey::new(
            rsa::BigUint::from_bytes_be(&n),
            rsa::BigUint::from_bytes_be(&e),
        )
        .map_err(|err| JoseError::invalid_key(err.to_string()))
    }
}

// =============================================================================
// Signing Key Pair
// =============================================================================

/// A server signing key pair.
///
/// Holds the PEM material alongside the prepared backend keys so the JWE
/// layer can reuse the same RSA private key for key transport decryption.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SignatureAlgorithm,

    /// PEM-encoded private key (PKCS#8).
    private_pem: String,

    /// PEM-encoded public key (SPKI).
    public_pem: String,

    /// Encoding key (private key) for signing.
    encoding_key: EncodingKey,

    /// Decoding key (public key) for verification.
    decoding_key: DecodingKey,

    /// Public key data for JWKS export.
    public_key_data: PublicKeyData,

    /// When the key was created.
    pub created_at: OffsetDateTime,
}

/// Internal representation of public key data for JWKS export.
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl SigningKeyPair {
    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Arguments
    /// * `algorithm` - The signing algorithm (must be an RS or PS variant)
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SignatureAlgorithm) -> Result<Self, JoseError> {
        if !algorithm.is_rsa() {
            return Err(JoseError::invalid_key(format!(
                "Algorithm {algorithm} is not RSA-based"
            )));
        }

        let bits = 2048;
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| JoseError::key_generation(e.to_string()))?;

        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JoseError::key_generation(e.to_string()))?
            .to_string();

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JoseError::key_generation(e.to_string()))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JoseError::key_generation(e.to_string()))?;

        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JoseError::key_generation(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm,
            private_pem,
            public_pem,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new EC key pair on the P-384 curve (ES384).
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JoseError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let public_key = signing_key.verifying_key();

        let point = public_key.to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JoseError::key_generation("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JoseError::key_generation("Missing y coordinate"))?;

        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JoseError::key_generation(e.to_string()))?
            .to_string();

        let public_pem = secret_key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JoseError::key_generation(e.to_string()))?;

        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JoseError::key_generation(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| JoseError::key_generation(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SignatureAlgorithm::ES384,
            private_pem,
            public_pem,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Loads a key pair from PEM strings.
    ///
    /// # Arguments
    /// * `kid` - Key ID
    /// * `algorithm` - Signing algorithm
    /// * `private_pem` - PEM-encoded private key (PKCS#8)
    /// * `public_pem` - PEM-encoded public key (SPKI)
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SignatureAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JoseError> {
        let (encoding_key, decoding_key, public_key_data) = if algorithm.is_rsa() {
            let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| JoseError::invalid_key(e.to_string()))?;
            let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|e| JoseError::invalid_key(e.to_string()))?;

            let public_key = RsaPublicKey::from_public_key_pem(public_pem)
                .map_err(|e| JoseError::invalid_key(e.to_string()))?;
            let n = public_key.n().to_bytes_be();
            let e = public_key.e().to_bytes_be();

            (encoding_key, decoding_key, PublicKeyData::Rsa { n, e })
        } else if algorithm.is_ec() {
            let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
                .map_err(|e| JoseError::invalid_key(e.to_string()))?;

            let secret_key = match EcSecretKey::from_pkcs8_pem(private_pem) {
                Ok(key) => key,
                Err(_) => EcSecretKey::from_sec1_pem(private_pem)
                    .map_err(|e| JoseError::invalid_key(e.to_string()))?,
            };
            let signing_key = EcSigningKey::from(&secret_key);
            let point = signing_key.verifying_key().to_encoded_point(false);
            let x = point
                .x()
                .ok_or_else(|| JoseError::invalid_key("Missing x coordinate"))?;
            let y = point
                .y()
                .ok_or_else(|| JoseError::invalid_key("Missing y coordinate"))?;

            let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
            let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
            let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
                .map_err(|e| JoseError::invalid_key(e.to_string()))?;

            (
                encoding_key,
                decoding_key,
                PublicKeyData::Ec {
                    x: x.to_vec(),
                    y: y.to_vec(),
                },
            )
        } else {
            return Err(JoseError::invalid_key(format!(
                "Algorithm {algorithm} has no key pair"
            )));
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            private_pem: private_pem.to_string(),
            public_pem: public_pem.to_string(),
            encoding_key,
            decoding_key,
            public_key_data,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// The prepared signing key.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// The prepared verification key.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// The PEM-encoded private key, for JWE key transport decryption.
    #[must_use]
    pub fn private_key_pem(&self) -> &str {
        &self.private_pem
    }

    /// The PEM-encoded public key.
    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: Some(self.kid.clone()),
                use_: Some("sig".to_string()),
                alg: Some(self.algorithm.as_str().to_string()),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: Some(self.kid.clone()),
                use_: Some("sig".to_string()),
                alg: Some(self.algorithm.as_str().to_string()),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
