//! Userinfo endpoint handler.
//!
//! Bearer-authenticated; a revoked or expired token is a 401 with a
//! `WWW-Authenticate` challenge, never a 200.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::http::bearer_token;
use crate::token::service::{TokenService, UserInfoReply};

/// State for the userinfo endpoint.
#[derive(Clone)]
pub struct UserInfoState {
    /// The token lifecycle service.
    pub token_service: Arc<TokenService>,
}

impl UserInfoState {
    /// Creates a new userinfo state.
    #[must_use]
    pub fn new(token_service: Arc<TokenService>) -> Self {
        Self { token_service }
    }
}

/// `GET /userinfo`
pub async fn userinfo_handler(
    State(state): State<UserInfoState>,
    headers: HeaderMap,
) -> Response {
    let Some(bearer) = bearer_token(&headers) else {
        return unauthorized("missing bearer token");
    };
    match state.token_service.userinfo_response(&bearer).await {
        Ok(UserInfoReply::Claims(claims)) => {
            Json(serde_json::Value::Object(claims)).into_response()
        }
        Ok(UserInfoReply::Jwt(jwt)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/jwt")],
            jwt,
        )
            .into_response(),
        Err(err) => unauthorized(&err.to_string()),
    }
}

fn unauthorized(description: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            format!("Bearer error=\"invalid_token\", error_description=\"{description}\""),
        )],
    )
        .into_response()
}
