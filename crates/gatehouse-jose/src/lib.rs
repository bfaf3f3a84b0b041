//! # gatehouse-jose
//!
//! JOSE engine for the Gatehouse authorization server.
//!
//! This crate provides:
//! - JWS signing and verification across the RS/ES/PS/HS algorithm families
//! - JWE compact encryption and decryption (RSA key transport, AES key wrap,
//!   AES-GCM content encryption)
//! - JWK/JWKS modeling and signing key pair generation
//! - OIDC token hash claims (`at_hash`, `c_hash`)
//! - Symmetric key derivation from client secrets
//!
//! ## Design
//!
//! Algorithm support is a capability set: each algorithm enum knows its wire
//! name, hash strength, and key requirements, and the sign/verify/encrypt/
//! decrypt entry points dispatch on it. Adding an algorithm is additive.
//!
//! ## Modules
//!
//! - [`alg`] - Algorithm capability enums
//! - [`jwk`] - JWK/JWKS types and signing key pairs
//! - [`jws`] - Signature creation and verification
//! - [`jwe`] - Encryption and decryption
//! - [`hash`] - OIDC left-half token hashes

pub mod alg;
pub mod error;
pub mod hash;
pub mod jwe;
pub mod jwk;
pub mod jws;

pub use alg::{ContentEncryptionAlgorithm, KeyManagementAlgorithm, SignatureAlgorithm};
pub use error::JoseError;
pub use hash::half_hash;
pub use jwe::{JweDecryptionKey, JweEncryptionKey, decrypt_compact, encrypt_compact};
pub use jwk::{Jwk, Jwks, SigningKeyPair};
pub use jws::{
    JoseHeader, SigningKey, VerificationKey, VerifyOptions, derive_secret_key, peek_header,
    sign_jws, verify_jws,
};

/// Type alias for JOSE operation results.
pub type JoseResult<T> = Result<T, JoseError>;
