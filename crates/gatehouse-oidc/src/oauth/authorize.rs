//! Authorization endpoint types and response-mode delivery.
//!
//! The authorization endpoint receives an [`AuthorizationRequest`], runs it
//! through the flow state machine, and delivers the outcome (success
//! parameters or an error) through the negotiated [`ResponseMode`]:
//! query parameters, fragment parameters, or an auto-submitting form post
//! that never exposes parameters in a URL.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

// =============================================================================
// Authorization Request
// =============================================================================

/// Authorization request parameters, as received on the query string.
///
/// A verified request object overlays these field by field before
/// validation; see [`crate::oauth::request_object`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// Space-separated response type set ("code", "code id_token", ...).
    #[serde(default)]
    pub response_type: String,

    /// Client identifier issued during registration.
    #[serde(default)]
    pub client_id: String,

    /// Redirect URI; must exactly match a registered one. May be omitted
    /// when the client has exactly one registered URI.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Requested scopes (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque client state, echoed back on every outcome.
    #[serde(default)]
    pub state: Option<String>,

    /// OIDC nonce, bound into issued ID tokens.
    #[serde(default)]
    pub nonce: Option<String>,

    /// Explicit response mode request.
    #[serde(default)]
    pub response_mode: Option<String>,

    /// OIDC prompt parameter ("none", "login", "consent", ...).
    #[serde(default)]
    pub prompt: Option<String>,

    /// Request object: a JWT (optionally nested in a JWE) carrying
    /// authorization parameters.
    #[serde(default)]
    pub request: Option<String>,

    /// PKCE code challenge.
    #[serde(default)]
    pub code_challenge: Option<String>,

    /// PKCE code challenge method.
    #[serde(default)]
    pub code_challenge_method: Option<String>,

    /// OIDC claims request, JSON-encoded.
    #[serde(default)]
    pub claims: Option<String>,
}

impl AuthorizationRequest {
    /// Parses the `claims` parameter, if present.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if the parameter is not valid JSON.
    pub fn parse_claims(&self) -> Result<Option<ClaimsRequest>, AuthError> {
        match self.claims.as_deref() {
            None => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|_| AuthError::invalid_request("claims parameter is not valid JSON")),
        }
    }

    /// Returns the requested scopes as a set.
    #[must_use]
    pub fn scope_set(&self) -> std::collections::BTreeSet<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

// =============================================================================
// Claims Request
// =============================================================================

/// OIDC claims request (`claims` parameter or request object member),
/// constraining the claims delivered in the ID token and at userinfo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsRequest {
    /// Claims requested for the ID token.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub id_token: BTreeMap<String, Option<ClaimRequestEntry>>,

    /// Claims requested for the userinfo response.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub userinfo: BTreeMap<String, Option<ClaimRequestEntry>>,
}

impl ClaimsRequest {
    /// Returns `true` if neither member requests anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_token.is_empty() && self.userinfo.is_empty()
    }
}

/// Constraints on an individual requested claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequestEntry {
    /// Whether the claim is essential for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    /// A specific value the claim must take.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// A list of acceptable values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

// =============================================================================
// Response Mode
// =============================================================================

/// How authorization result parameters are delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Parameters in the redirect URI query component.
    Query,
    /// Parameters in the redirect URI fragment component.
    Fragment,
    /// Parameters posted by an auto-submitting HTML form.
    FormPost,
}

impl ResponseMode {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
            Self::FormPost => "form_post",
        }
    }

    /// Parses a wire value.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for unknown modes.
    pub fn parse(s: &str) -> Result<Self, AuthError> {
        match s {
            "query" => Ok(Self::Query),
            "fragment" => Ok(Self::Fragment),
            "form_post" => Ok(Self::FormPost),
            other => Err(AuthError::invalid_request(format!(
                "unknown response_mode {other}"
            ))),
        }
    }

    /// The default mode: `query` for code-only flows, `fragment` for any
    /// flow that issues tokens from the authorization endpoint.
    #[must_use]
    pub fn default_for(issues_tokens_directly: bool) -> Self {
        if issues_tokens_directly {
            Self::Fragment
        } else {
            Self::Query
        }
    }

    /// Whether this mode may carry the given flow's response. `query` must
    /// never carry tokens issued directly from the authorization endpoint.
    #[must_use]
    pub fn is_compatible(&self, issues_tokens_directly: bool) -> bool {
        !(issues_tokens_directly && *self == Self::Query)
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Authorization Reply
// =============================================================================

/// The delivered authorization outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeReply {
    /// Redirect the user agent to this URL.
    Redirect(String),

    /// Render this auto-submitting HTML page (form_post mode).
    FormPost(String),
}

impl AuthorizeReply {
    /// Builds the reply for a parameter set under the given response mode.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if the redirect URI cannot be parsed.
    pub fn deliver(
        mode: ResponseMode,
        redirect_uri: &str,
        params: &[(String, String)],
    ) -> Result<Self, AuthError> {
        match mode {
            ResponseMode::Query => {
                let mut url = url::Url::parse(redirect_uri)
                    .map_err(|_| AuthError::invalid_request("redirect_uri is not a valid URL"))?;
                {
                    let mut pairs = url.query_pairs_mut();
                    for (k, v) in params {
                        pairs.append_pair(k, v);
                    }
                }
                Ok(Self::Redirect(url.to_string()))
            }
            ResponseMode::Fragment => {
                let url = url::Url::parse(redirect_uri)
                    .map_err(|_| AuthError::invalid_request("redirect_uri is not a valid URL"))?;
                let fragment = params
                    .iter()
                    .map(|(k, v)| {
                        format!(
                            "{}={}",
                            urlencode(k),
                            urlencode(v)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                Ok(Self::Redirect(format!("{url}#{fragment}")))
            }
            ResponseMode::FormPost => Ok(Self::FormPost(render_form_post(redirect_uri, params))),
        }
    }
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders the auto-submitting form_post page. Parameters travel only in
/// the POST body, never in a URL.
fn render_form_post(redirect_uri: &str, params: &[(String, String)]) -> String {
    let mut inputs = String::new();
    for (k, v) in params {
        inputs.push_str(&format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>\n",
            html_escape(k),
            html_escape(v)
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Submit This Form</title></head>\n\
         <body onload=\"document.forms[0].submit()\">\n\
         <form method=\"post\" action=\"{}\">\n{}</form>\n</body>\n</html>\n",
        html_escape(redirect_uri),
        inputs
    )
}

// =============================================================================
// Tests
// =============================================================================
