//! Axum HTTP handlers for the authorization server endpoints.
//!
//! Each endpoint lives in its own module with a `State` struct; assembling
//! them into a router (and everything else about serving HTTP) is the
//! embedding application's concern.
//!
//! ```ignore
//! use axum::{Router, routing::{get, post}};
//! use gatehouse_oidc::http::*;
//!
//! let app = Router::new()
//!     .route("/register", post(register_handler).with_state(registration))
//!     .route("/authorize", get(authorize_handler).with_state(authorize))
//!     .route("/token", post(token_handler).with_state(token))
//!     .route("/revoke", post(revoke_handler).with_state(revoke))
//!     .route("/userinfo", get(userinfo_handler).with_state(userinfo))
//!     .route("/end_session", get(end_session_handler).with_state(end_session))
//!     .route("/jwks", get(jwks_handler).with_state(jwks));
//! ```

pub mod authorize;
pub mod end_session;
pub mod jwks;
pub mod register;
pub mod revoke;
pub mod token;
pub mod userinfo;

use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;

use crate::error::AuthError;

pub use authorize::{AuthorizeState, authorize_handler};
pub use end_session::{EndSessionState, end_session_handler};
pub use jwks::{JwksState, jwks_handler};
pub use register::{
    RegistrationState, register_delete_handler, register_handler, register_read_handler,
    register_update_handler,
};
pub use revoke::{RevocationState, revoke_handler};
pub use token::{TokenState, token_handler};
pub use userinfo::{UserInfoState, userinfo_handler};

/// OAuth 2.0 error body for direct JSON responses.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthErrorBody {
    /// Machine-readable error code.
    pub error: String,

    /// Human-readable description.
    pub error_description: String,
}

/// Maps an [`AuthError`] onto its HTTP status and JSON body.
#[must_use]
pub fn error_response(err: &AuthError) -> (StatusCode, Json<OAuthErrorBody>) {
    (
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_REQUEST),
        Json(OAuthErrorBody {
            error: err.oauth_error_code().to_string(),
            error_description: err.to_string(),
        }),
    )
}

/// Extracts HTTP Basic credentials from the Authorization header.
#[must_use]
pub fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Extracts a bearer token from the Authorization header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
