//! Token revocation request types (RFC 7009).
//!
//! The endpoint returns 200 OK even for unknown or already-revoked tokens,
//! so callers cannot probe which tokens exist. Missing the `token`
//! parameter itself is a 400.

use serde::{Deserialize, Serialize};

/// Token revocation request.
#[derive(Debug, Clone, Deserialize)]
pub struct RevocationRequest {
    /// The token to revoke.
    pub token: String,

    /// Optional hint about the token type. Without it, both types are
    /// tried.
    #[serde(default)]
    pub token_type_hint: Option<TokenTypeHint>,
}

/// Token type hint for revocation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// The token is an access token.
    AccessToken,
    /// The token is a refresh token.
    RefreshToken,
}

impl TokenTypeHint {
    /// Returns the hint's wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a wire value; unknown hints are ignored per RFC 7009.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenTypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"token": "abc123"}"#;
        let request: RevocationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.token, "abc123");
        assert!(request.token_type_hint.is_none());

        let json = r#"{"token": "abc123", "token_type_hint": "refresh_token"}"#;
        let request: RevocationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.token_type_hint, Some(TokenTypeHint::RefreshToken));
    }

    #[test]
    fn test_hint_parse() {
        assert_eq!(
            TokenTypeHint::parse("access_token"),
            Some(TokenTypeHint::AccessToken)
        );
        assert_eq!(
            TokenTypeHint::parse("refresh_token"),
            Some(TokenTypeHint::RefreshToken)
        );
        // Unknown hints are ignored, not an error.
        assert_eq!(TokenTypeHint::parse("id_token"), None);
    }

    #[test]
    fn test_hint_display() {
        assert_eq!(TokenTypeHint::AccessToken.to_string(), "access_token");
        assert_eq!(TokenTypeHint::RefreshToken.to_string(), "refresh_token");
    }
}
