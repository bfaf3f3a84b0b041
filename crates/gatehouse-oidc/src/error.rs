//! Authorization server error types.
//!
//! This module defines all error types that can occur during registration,
//! authorization, and token operations, together with their mapping onto
//! OAuth 2.0 wire error codes and HTTP status codes.

use gatehouse_jose::JoseError;

/// Errors that can occur during authorization server operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client credentials are invalid or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization grant, code, or refresh token is invalid, expired,
    /// consumed, or revoked.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The requested scope is invalid, unknown, or exceeds what was granted.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The access token is invalid, expired, or revoked.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The request lacks valid authentication credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The request is malformed or missing required parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The resource owner or the server denied the request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The requested response type set is not registered for the client.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The offending response type value.
        response_type: String,
    },

    /// The requested grant type is not allowed for the client.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The offending grant type value.
        grant_type: String,
    },

    /// User consent is required but cannot be obtained (prompt=none).
    #[error("Consent required")]
    ConsentRequired,

    /// User authentication is required but cannot be obtained (prompt=none).
    #[error("Login required")]
    LoginRequired,

    /// The request object failed decryption, signature verification, or
    /// claim validation.
    #[error("Invalid request object: {message}")]
    InvalidRequestObject {
        /// Description of the failure.
        message: String,
    },

    /// A registration parameter failed validation.
    #[error("Invalid client metadata ({parameter}): {message}")]
    Registration {
        /// The registration parameter that failed.
        parameter: &'static str,
        /// Description of why it failed.
        message: String,
    },

    /// A software statement could not be verified.
    #[error("Invalid software statement: {message}")]
    SoftwareStatement {
        /// Description of the failure.
        message: String,
    },

    /// A cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] JoseError),

    /// An error occurred while storing or retrieving data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `InvalidRequestObject` error.
    #[must_use]
    pub fn invalid_request_object(message: impl Into<String>) -> Self {
        Self::InvalidRequestObject {
            message: message.into(),
        }
    }

    /// Creates a new `Registration` error naming the failing parameter.
    #[must_use]
    pub fn registration(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::Registration {
            parameter,
            message: message.into(),
        }
    }

    /// Creates a new `SoftwareStatement` error.
    #[must_use]
    pub fn software_statement(message: impl Into<String>) -> Self {
        Self::SoftwareStatement {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Internal { .. })
    }

    /// Returns `true` if the error should be delivered via the authorization
    /// response mode (redirect or form post) rather than a direct response.
    #[must_use]
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied { .. }
                | Self::UnsupportedResponseType { .. }
                | Self::InvalidScope { .. }
                | Self::ConsentRequired
                | Self::LoginRequired
                | Self::InvalidRequestObject { .. }
        )
    }

    /// Returns the OAuth 2.0 wire error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidToken { .. } => "invalid_token",
            Self::Unauthorized { .. } => "invalid_client",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::ConsentRequired => "consent_required",
            Self::LoginRequired => "login_required",
            Self::InvalidRequestObject { .. } => "invalid_request_object",
            Self::Registration { .. } => "invalid_client_metadata",
            Self::SoftwareStatement { .. } => "invalid_software_statement",
            Self::Crypto(_) => "invalid_request",
            Self::Storage { .. } | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the HTTP status code for a direct (non-redirect) response.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } | Self::InvalidClient { .. } | Self::InvalidToken { .. } => {
                401
            }
            Self::Storage { .. } | Self::Internal { .. } => 500,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client not found");
        assert_eq!(err.to_string(), "Invalid client: client not found");

        let err = AuthError::registration("redirect_uris", "must use https");
        assert_eq!(
            err.to_string(),
            "Invalid client metadata (redirect_uris): must use https"
        );

        assert_eq!(AuthError::ConsentRequired.to_string(), "Consent required");
    }

    #[test]
    fn test_oauth_error_codes() {
        assert_eq!(
            AuthError::invalid_grant("x").oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::ConsentRequired.oauth_error_code(),
            "consent_required"
        );
        assert_eq!(AuthError::LoginRequired.oauth_error_code(), "login_required");
        assert_eq!(
            AuthError::invalid_request_object("bad sig").oauth_error_code(),
            "invalid_request_object"
        );
        assert_eq!(
            AuthError::registration("jwks", "bad").oauth_error_code(),
            "invalid_client_metadata"
        );
        assert_eq!(AuthError::storage("down").oauth_error_code(), "server_error");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(AuthError::invalid_client("x").http_status(), 401);
        assert_eq!(AuthError::invalid_token("x").http_status(), 401);
        assert_eq!(AuthError::invalid_grant("x").http_status(), 400);
        assert_eq!(AuthError::registration("p", "x").http_status(), 400);
        assert_eq!(AuthError::internal("x").http_status(), 500);
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthError::invalid_grant("x").is_client_error());
        assert!(AuthError::storage("x").is_server_error());
        assert!(AuthError::ConsentRequired.is_authorization_error());
        assert!(AuthError::unsupported_response_type("token").is_authorization_error());
        assert!(!AuthError::invalid_client("x").is_authorization_error());
    }

    #[test]
    fn test_crypto_error_conversion() {
        let err: AuthError = JoseError::SignatureInvalid.into();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert_eq!(err.http_status(), 400);
    }
}
