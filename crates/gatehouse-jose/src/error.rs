//! JOSE error types.

/// Errors that can occur during JOSE operations.
#[derive(Debug, thiserror::Error)]
pub enum JoseError {
    /// The token is not a structurally valid compact serialization.
    #[error("Malformed token: {message}")]
    MalformedToken {
        /// Description of the structural problem.
        message: String,
    },

    /// The algorithm is not supported by this build.
    #[error("Unsupported algorithm: {alg}")]
    UnsupportedAlgorithm {
        /// The requested algorithm name.
        alg: String,
    },

    /// The signature did not verify against the resolved key.
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// The token is signed but has expired.
    #[error("Token expired")]
    Expired,

    /// JWE decryption failed (wrong key, corrupted ciphertext, or bad tag).
    #[error("Decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Encryption could not be performed.
    #[error("Encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// No usable key was found for the operation.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The key id that could not be resolved.
        kid: String,
    },

    /// The key material is invalid or does not match the algorithm.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of the key problem.
        message: String,
    },

    /// Key pair generation failed.
    #[error("Key generation failed: {message}")]
    KeyGeneration {
        /// Description of the failure.
        message: String,
    },

    /// Claims could not be serialized or deserialized.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },
}

impl JoseError {
    /// Creates a new `MalformedToken` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported(alg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm { alg: alg.into() }
    }

    /// Creates a new `DecryptionFailed` error.
    #[must_use]
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `EncryptionFailed` error.
    #[must_use]
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGeneration` error.
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns `true` if the error indicates the token failed validation
    /// (as opposed to a key or configuration problem).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken { .. }
                | Self::SignatureInvalid
                | Self::Expired
                | Self::DecryptionFailed { .. }
        )
    }

    /// Returns `true` if the error is a key resolution/material problem.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound { .. } | Self::InvalidKey { .. } | Self::KeyGeneration { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JoseError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::unsupported(err.to_string()),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::SignatureInvalid,
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::malformed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JoseError::unsupported("ES512");
        assert_eq!(err.to_string(), "Unsupported algorithm: ES512");

        let err = JoseError::key_not_found("kid-1");
        assert_eq!(err.to_string(), "Key not found: kid-1");

        assert_eq!(
            JoseError::SignatureInvalid.to_string(),
            "Signature verification failed"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(JoseError::SignatureInvalid.is_validation_error());
        assert!(JoseError::Expired.is_validation_error());
        assert!(!JoseError::SignatureInvalid.is_key_error());

        assert!(JoseError::key_not_found("x").is_key_error());
        assert!(JoseError::invalid_key("bad pem").is_key_error());
        assert!(!JoseError::invalid_key("bad pem").is_validation_error());
    }
}
