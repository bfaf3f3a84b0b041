//! Token endpoint request and response types.

use serde::{Deserialize, Serialize};

// =============================================================================
// Token Request
// =============================================================================

/// Token endpoint request parameters (`application/x-www-form-urlencoded`).
///
/// One type covers every grant; the service dispatches on `grant_type` and
/// validates the fields that grant requires.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// The grant being redeemed ("authorization_code", "refresh_token",
    /// "client_credentials").
    pub grant_type: String,

    /// Authorization code (authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI the code was bound to (authorization_code grant).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier (authorization_code grant).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Refresh token (refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope (refresh_token / client_credentials grants).
    #[serde(default)]
    pub scope: Option<String>,

    /// Client ID (public clients or client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Client assertion type (client_secret_jwt / private_key_jwt).
    #[serde(default)]
    pub client_assertion_type: Option<String>,

    /// Client assertion JWT.
    #[serde(default)]
    pub client_assertion: Option<String>,
}

// =============================================================================
// Token Response
// =============================================================================

/// Successful token endpoint response (RFC 6749 Section 5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token (a signed JWT).
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Space-separated granted scope.
    pub scope: String,

    /// Refresh token, when the grant lineage includes `refresh_token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token, when `openid` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Creates a new bearer token response.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
            id_token: None,
        }
    }

    /// Attaches a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }

    /// Attaches an ID token.
    #[must_use]
    pub fn with_id_token(mut self, token: String) -> Self {
        self.id_token = Some(token);
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_authorization_code() {
        let form = "grant_type=authorization_code&code=abc&redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb&code_verifier=ver&client_id=my-app";
        let request: TokenRequest = serde_urlencoded_from_str(form);
        assert_eq!(request.grant_type, "authorization_code");
        assert_eq!(request.code.as_deref(), Some("abc"));
        assert_eq!(
            request.redirect_uri.as_deref(),
            Some("https://app.example.com/cb")
        );
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_token_request_refresh() {
        let form = "grant_type=refresh_token&refresh_token=rt&scope=openid";
        let request: TokenRequest = serde_urlencoded_from_str(form);
        assert_eq!(request.grant_type, "refresh_token");
        assert_eq!(request.refresh_token.as_deref(), Some("rt"));
        assert_eq!(request.scope.as_deref(), Some("openid"));
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse::new("jwt".to_string(), 3600, "openid".to_string())
            .with_refresh_token("rt".to_string())
            .with_id_token("idt".to_string());

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""token_type":"Bearer""#));
        assert!(json.contains(r#""expires_in":3600"#));
        assert!(json.contains(r#""refresh_token":"rt""#));
        assert!(json.contains(r#""id_token":"idt""#));
    }

    #[test]
    fn test_token_response_omits_absent_fields() {
        let response = TokenResponse::new("jwt".to_string(), 3600, "openid".to_string());
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(!json.contains("id_token"));
    }

    // Minimal form decoding for tests without pulling serde_urlencoded in:
    // the axum Form extractor handles this on the real path.
    fn serde_urlencoded_from_str(form: &str) -> TokenRequest {
        let map: std::collections::HashMap<String, String> = form
            .split('&')
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                let decoded: String =
                    url::form_urlencoded::parse(format!("x={v}").as_bytes())
                        .next()
                        .map(|(_, v)| v.into_owned())?;
                Some((k.to_string(), decoded))
            })
            .collect();
        serde_json::from_value(serde_json::to_value(map).unwrap()).unwrap()
    }
}
