//! Token revocation endpoint handler (RFC 7009).
//!
//! Per RFC 7009, the endpoint returns 200 OK even for unknown tokens.
//! Only client authentication failures (401) and a missing `token`
//! parameter (400) produce errors.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::http::{error_response, parse_basic_auth};
use crate::oauth::client_auth::authenticate_client;
use crate::oauth::token::TokenRequest;
use crate::storage::ClientStorage;
use crate::token::revocation::{RevocationRequest, TokenTypeHint};
use crate::token::service::TokenService;

/// State for the revocation endpoint.
#[derive(Clone)]
pub struct RevocationState {
    /// The token lifecycle service.
    pub token_service: Arc<TokenService>,

    /// Client registry for authentication.
    pub clients: Arc<dyn ClientStorage>,
}

impl RevocationState {
    /// Creates a new revocation state.
    #[must_use]
    pub fn new(token_service: Arc<TokenService>, clients: Arc<dyn ClientStorage>) -> Self {
        Self {
            token_service,
            clients,
        }
    }
}

/// Form parameters for the revocation endpoint.
#[derive(Debug, Deserialize)]
pub struct RevocationForm {
    /// The token to revoke. Its absence is the one 400 this endpoint has.
    #[serde(default)]
    pub token: Option<String>,

    /// Optional token type hint; unknown hints are ignored.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    /// Client ID (client_secret_post or public clients).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post).
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// `POST /revoke`
pub async fn revoke_handler(
    State(state): State<RevocationState>,
    headers: HeaderMap,
    Form(form): Form<RevocationForm>,
) -> Response {
    let auth_request = TokenRequest {
        client_id: form.client_id.clone(),
        client_secret: form.client_secret.clone(),
        ..Default::default()
    };
    let basic = parse_basic_auth(&headers);
    let issuer = state.token_service.issuer().issuer().to_string();

    let authenticated =
        match authenticate_client(&auth_request, basic, state.clients.as_ref(), &issuer).await {
            Ok(authenticated) => authenticated,
            Err(err) => return error_response(&err).into_response(),
        };

    let Some(token) = form.token else {
        return error_response(&crate::error::AuthError::invalid_request(
            "missing token parameter",
        ))
        .into_response();
    };

    let request = RevocationRequest {
        token,
        token_type_hint: form.token_type_hint.as_deref().and_then(TokenTypeHint::parse),
    };
    match state.token_service.revoke(&request, &authenticated.client).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
