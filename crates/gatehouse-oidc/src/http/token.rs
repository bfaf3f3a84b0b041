//! Token endpoint handler.
//!
//! Accepts `application/x-www-form-urlencoded` bodies, authenticates the
//! client (Basic, body credentials, or client assertion), and dispatches
//! to the grant handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};

use crate::http::{error_response, parse_basic_auth};
use crate::oauth::client_auth::authenticate_client;
use crate::oauth::token::TokenRequest;
use crate::storage::ClientStorage;
use crate::token::service::TokenService;

/// State for the token endpoint.
#[derive(Clone)]
pub struct TokenState {
    /// The token lifecycle service.
    pub token_service: Arc<TokenService>,

    /// Client registry for authentication.
    pub clients: Arc<dyn ClientStorage>,
}

impl TokenState {
    /// Creates a new token state.
    #[must_use]
    pub fn new(token_service: Arc<TokenService>, clients: Arc<dyn ClientStorage>) -> Self {
        Self {
            token_service,
            clients,
        }
    }
}

/// `POST /token`
pub async fn token_handler(
    State(state): State<TokenState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    let basic = parse_basic_auth(&headers);
    let issuer = state.token_service.issuer().issuer().to_string();

    let authenticated =
        match authenticate_client(&request, basic, state.clients.as_ref(), &issuer).await {
            Ok(authenticated) => authenticated,
            Err(err) => return error_response(&err).into_response(),
        };

    match state
        .token_service
        .handle(&request, &authenticated.client)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
