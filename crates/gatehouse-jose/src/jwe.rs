//! JWE compact encryption and decryption.
//!
//! Supports the key management algorithms the server negotiates at client
//! registration: RSA key transport (RSA1_5, RSA-OAEP, RSA-OAEP-256) against
//! a recipient's public key, and AES key wrap (A128KW/A192KW/A256KW) against
//! a key derived from the client secret. Content encryption is AES-GCM.
//!
//! The compact form is `header.encrypted_key.iv.ciphertext.tag`, with the
//! base64url header serving as the AEAD associated data.

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use aes_kw::Kek;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

use crate::alg::{ContentEncryptionAlgorithm, KeyManagementAlgorithm};
use crate::error::JoseError;
use crate::jws::{JoseHeader, peek_header};

type Aes192Gcm = AesGcm<Aes192, U12>;

const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

// =============================================================================
// Key material
// =============================================================================

/// Key material for encrypting to a recipient.
pub enum JweEncryptionKey<'a> {
    /// The recipient's RSA public key (for the RSA transport algorithms).
    RsaPublic(&'a RsaPublicKey),

    /// A key-encryption key (for the AES key wrap algorithms), typically
    /// derived from the client secret.
    Symmetric(&'a [u8]),
}

/// Key material for decrypting a received JWE.
pub enum JweDecryptionKey<'a> {
    /// The server's PEM-encoded RSA private key.
    RsaPrivatePem(&'a str),

    /// A key-encryption key derived from the client secret.
    Symmetric(&'a [u8]),
}

// =============================================================================
// Encryption
// =============================================================================

/// Encrypts a payload into a compact JWE.
///
/// `cty` names the payload content type; pass `Some("JWT")` when nesting a
/// signed token.
///
/// # Errors
///
/// Returns [`JoseError::EncryptionFailed`] or [`JoseError::InvalidKey`] if
/// the key material does not match the algorithm.
pub fn encrypt_compact(
    plaintext: &[u8],
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &JweEncryptionKey<'_>,
    cty: Option<&str>,
) -> Result<String, JoseError> {
    let mut header = serde_json::Map::new();
    header.insert("alg".into(), alg.as_str().into());
    header.insert("enc".into(), enc.as_str().into());
    if let Some(cty) = cty {
        header.insert("cty".into(), cty.into());
    }
    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| JoseError::encoding(e.to_string()))?,
    );

    let mut cek = vec![0u8; enc.key_len()];
    OsRng.fill_bytes(&mut cek);

    let encrypted_key = match (key, alg.is_rsa()) {
        (JweEncryptionKey::RsaPublic(public), true) => rsa_encrypt_cek(alg, public, &cek)?,
        (JweEncryptionKey::Symmetric(kek), false) => wrap_cek(alg, kek, &cek)?,
        _ => {
            return Err(JoseError::invalid_key(format!(
                "key material does not match {alg}"
            )));
        }
    };

    let mut iv = [0u8; GCM_IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let sealed = gcm_encrypt(enc, &cek, &iv, plaintext, header_b64.as_bytes())?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - GCM_TAG_LEN);

    Ok(format!(
        "{header_b64}.{}.{}.{}.{}",
        URL_SAFE_NO_PAD.encode(&encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ))
}

// =============================================================================
// Decryption
// =============================================================================

/// Decrypts a compact JWE, returning the plaintext and the parsed header.
///
/// # Errors
///
/// Returns [`JoseError::MalformedToken`] for structural problems and
/// [`JoseError::DecryptionFailed`] when the key or ciphertext is wrong.
pub fn decrypt_compact(
    token: &str,
    key: &JweDecryptionKey<'_>,
) -> Result<(Vec<u8>, JoseHeader), JoseError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 5 {
        return Err(JoseError::malformed("JWE must have five segments"));
    }

    let header = peek_header(token)?;
    let alg = KeyManagementAlgorithm::parse(&header.alg)?;
    let enc = header
        .enc
        .as_deref()
        .ok_or_else(|| JoseError::malformed("JWE header missing enc"))
        .and_then(ContentEncryptionAlgorithm::parse)?;

    let encrypted_key = decode_segment(parts[1], "encrypted key")?;
    let iv = decode_segment(parts[2], "iv")?;
    let ciphertext = decode_segment(parts[3], "ciphertext")?;
    let tag = decode_segment(parts[4], "tag")?;

    if iv.len() != GCM_IV_LEN {
        return Err(JoseError::decryption("unexpected iv length"));
    }

    let cek = match (key, alg.is_rsa()) {
        (JweDecryptionKey::RsaPrivatePem(pem), true) => {
            rsa_decrypt_cek(alg, pem, &encrypted_key)?
        }
        (JweDecryptionKey::Symmetric(kek), false) => unwrap_cek(alg, kek, &encrypted_key)?,
        _ => {
            return Err(JoseError::invalid_key(format!(
                "key material does not match {alg}"
            )));
        }
    };
    if cek.len() != enc.key_len() {
        return Err(JoseError::decryption("unwrapped key has wrong length"));
    }

    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);
    let plaintext = gcm_decrypt(enc, &cek, &iv, &sealed, parts[0].as_bytes())?;
    Ok((plaintext, header))
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, JoseError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| JoseError::malformed(format!("{what} is not base64url")))
}

// =============================================================================
// Key management dispatch
// =============================================================================

fn rsa_encrypt_cek(
    alg: KeyManagementAlgorithm,
    public: &RsaPublicKey,
    cek: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let result = match alg {
        KeyManagementAlgorithm::Rsa1_5 => public.encrypt(&mut OsRng, Pkcs1v15Encrypt, cek),
        KeyManagementAlgorithm::RsaOaep => public.encrypt(&mut OsRng, Oaep::new::<Sha1>(), cek),
        KeyManagementAlgorithm::RsaOaep256 => {
            public.encrypt(&mut OsRng, Oaep::new::<Sha256>(), cek)
        }
        _ => return Err(JoseError::unsupported(alg.as_str())),
    };
    result.map_err(|e| JoseError::encryption(e.to_string()))
}

fn rsa_decrypt_cek(
    alg: KeyManagementAlgorithm,
    private_pem: &str,
    encrypted_key: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let private = RsaPrivateKey::from_pkcs8_pem(private_pem)
        .map_err(|e| JoseError::invalid_key(e.to_string()))?;
    let result = match alg {
        KeyManagementAlgorithm::Rsa1_5 => private.decrypt(Pkcs1v15Encrypt, encrypted_key),
        KeyManagementAlgorithm::RsaOaep => private.decrypt(Oaep::new::<Sha1>(), encrypted_key),
        KeyManagementAlgorithm::RsaOaep256 => {
            private.decrypt(Oaep::new::<Sha256>(), encrypted_key)
        }
        _ => return Err(JoseError::unsupported(alg.as_str())),
    };
    result.map_err(|_| JoseError::decryption("RSA key transport failed"))
}

fn wrap_cek(
    alg: KeyManagementAlgorithm,
    kek: &[u8],
    cek: &[u8],
) -> Result<Vec<u8>, JoseError> {
    if kek.len() != alg.kek_len() {
        return Err(JoseError::invalid_key(format!(
            "{alg} requires a {}-byte key-encryption key",
            alg.kek_len()
        )));
    }
    let wrapped = match alg {
        KeyManagementAlgorithm::A128Kw => Kek::<Aes128>::try_from(kek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .wrap_vec(cek),
        KeyManagementAlgorithm::A192Kw => Kek::<Aes192>::try_from(kek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .wrap_vec(cek),
        KeyManagementAlgorithm::A256Kw => Kek::<Aes256>::try_from(kek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .wrap_vec(cek),
        _ => return Err(JoseError::unsupported(alg.as_str())),
    };
    wrapped.map_err(|e| JoseError::encryption(e.to_string()))
}

fn unwrap_cek(
    alg: KeyManagementAlgorithm,
    kek: &[u8],
    wrapped: &[u8],
) -> Result<Vec<u8>, JoseError> {
    if kek.len() != alg.kek_len() {
        return Err(JoseError::invalid_key(format!(
            "{alg} requires a {}-byte key-encryption key",
            alg.kek_len()
        )));
    }
    let cek = match alg {
        KeyManagementAlgorithm::A128Kw => Kek::<Aes128>::try_from(kek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .unwrap_vec(wrapped),
        KeyManagementAlgorithm::A192Kw => Kek::<Aes192>::try_from(kek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .unwrap_vec(wrapped),
        KeyManagementAlgorithm::A256Kw => Kek::<Aes256>::try_from(kek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .unwrap_vec(wrapped),
        _ => return Err(JoseError::unsupported(alg.as_str())),
    };
    cek.map_err(|_| JoseError::decryption("AES key unwrap failed"))
}

// =============================================================================
// Content encryption dispatch
// =============================================================================

fn gcm_encrypt(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    let result = match enc {
        ContentEncryptionAlgorithm::A128Gcm => Aes128Gcm::new_from_slice(cek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .encrypt(Nonce::from_slice(iv), payload),
        ContentEncryptionAlgorithm::A192Gcm => Aes192Gcm::new_from_slice(cek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .encrypt(Nonce::from_slice(iv), payload),
        ContentEncryptionAlgorithm::A256Gcm => Aes256Gcm::new_from_slice(cek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .encrypt(Nonce::from_slice(iv), payload),
    };
    result.map_err(|_| JoseError::encryption("AES-GCM sealing failed"))
}

fn gcm_decrypt(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    sealed: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let payload = Payload { msg: sealed, aad };
    let result = match enc {
        ContentEncryptionAlgorithm::A128Gcm => Aes128Gcm::new_from_slice(cek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .decrypt(Nonce::from_slice(iv), payload),
        ContentEncryptionAlgorithm::A192Gcm => Aes192Gcm::new_from_slice(cek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .decrypt(Nonce::from_slice(iv), payload),
        ContentEncryptionAlgorithm::A256Gcm => Aes256Gcm::new_from_slice(cek)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?
            .decrypt(Nonce::from_slice(iv), payload),
    };
    result.map_err(|_| JoseError::decryption("AES-GCM tag verification failed"))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::SignatureAlgorithm;
    use crate::jwk::SigningKeyPair;
    use crate::jws::derive_secret_key;

    fn rsa_pair() -> SigningKeyPair {
        SigningKeyPair::generate_rsa(SignatureAlgorithm::RS256).unwrap()
    }

    fn rsa_roundtrip(alg: KeyManagementAlgorithm) {
        let pair = rsa_pair();
        let public = pair.to_jwk().to_rsa_public_key().unwrap();

        let token = encrypt_compact(
            b"the quick brown fox",
            alg,
            ContentEncryptionAlgorithm::A256Gcm,
            &JweEncryptionKey::RsaPublic(&public),
            Some("JWT"),
        )
        .unwrap();
        assert_eq!(token.split('.').count(), 5);

        let (plaintext, header) = decrypt_compact(
            &token,
            &JweDecryptionKey::RsaPrivatePem(pair.private_key_pem()),
        )
        .unwrap();
        assert_eq!(plaintext, b"the quick brown fox");
        assert_eq!(header.alg, alg.as_str());
        assert_eq!(header.cty.as_deref(), Some("JWT"));
        assert!(header.is_encrypted());
    }

    #[test]
    fn test_rsa1_5_roundtrip() {
        rsa_roundtrip(KeyManagementAlgorithm::Rsa1_5);
    }

    #[test]
    fn test_rsa_oaep_roundtrip() {
        rsa_roundtrip(KeyManagementAlgorithm::RsaOaep);
    }

    #[test]
    fn test_rsa_oaep_256_roundtrip() {
        rsa_roundtrip(KeyManagementAlgorithm::RsaOaep256);
    }

    #[test]
    fn test_aes_kw_roundtrip() {
        for (alg, enc) in [
            (
                KeyManagementAlgorithm::A128Kw,
                ContentEncryptionAlgorithm::A128Gcm,
            ),
            (
                KeyManagementAlgorithm::A192Kw,
                ContentEncryptionAlgorithm::A192Gcm,
            ),
            (
                KeyManagementAlgorithm::A256Kw,
                ContentEncryptionAlgorithm::A256Gcm,
            ),
        ] {
            let kek = derive_secret_key("client-secret-value", alg.kek_len());
            let token = encrypt_compact(
                b"payload",
                alg,
                enc,
                &JweEncryptionKey::Symmetric(&kek),
                None,
            )
            .unwrap();

            let (plaintext, _) =
                decrypt_compact(&token, &JweDecryptionKey::Symmetric(&kek)).unwrap();
            assert_eq!(plaintext, b"payload");
        }
    }

    #[test]
    fn test_wrong_kek_fails() {
        let kek = derive_secret_key("right-secret", 32);
        let token = encrypt_compact(
            b"payload",
            KeyManagementAlgorithm::A256Kw,
            ContentEncryptionAlgorithm::A256Gcm,
            &JweEncryptionKey::Symmetric(&kek),
            None,
        )
        .unwrap();

        let wrong = derive_secret_key("wrong-secret", 32);
        let err = decrypt_compact(&token, &JweDecryptionKey::Symmetric(&wrong)).unwrap_err();
        assert!(matches!(err, JoseError::DecryptionFailed { .. }));
    }

    #[test]
    fn test_wrong_rsa_key_fails() {
        let pair = rsa_pair();
        let other = rsa_pair();
        let public = pair.to_jwk().to_rsa_public_key().unwrap();

        let token = encrypt_compact(
            b"payload",
            KeyManagementAlgorithm::RsaOaep,
            ContentEncryptionAlgorithm::A256Gcm,
            &JweEncryptionKey::RsaPublic(&public),
            None,
        )
        .unwrap();

        let err = decrypt_compact(
            &token,
            &JweDecryptionKey::RsaPrivatePem(other.private_key_pem()),
        )
        .unwrap_err();
        assert!(matches!(err, JoseError::DecryptionFailed { .. }));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let kek = derive_secret_key("secret", 16);
        let token = encrypt_compact(
            b"payload",
            KeyManagementAlgorithm::A128Kw,
            ContentEncryptionAlgorithm::A128Gcm,
            &JweEncryptionKey::Symmetric(&kek),
            None,
        )
        .unwrap();

        // Flip the ciphertext segment.
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        parts[3] = URL_SAFE_NO_PAD.encode(b"tampered!");
        let forged = parts.join(".");

        let err = decrypt_compact(&forged, &JweDecryptionKey::Symmetric(&kek)).unwrap_err();
        assert!(matches!(err, JoseError::DecryptionFailed { .. }));
    }

    #[test]
    fn test_mismatched_key_material_rejected() {
        let kek = derive_secret_key("secret", 32);
        let err = encrypt_compact(
            b"payload",
            KeyManagementAlgorithm::RsaOaep,
            ContentEncryptionAlgorithm::A256Gcm,
            &JweEncryptionKey::Symmetric(&kek),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, JoseError::InvalidKey { .. }));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let kek = derive_secret_key("secret", 32);
        let err = decrypt_compact("a.b.c", &JweDecryptionKey::Symmetric(&kek)).unwrap_err();
        assert!(matches!(err, JoseError::MalformedToken { .. }));
    }
}
