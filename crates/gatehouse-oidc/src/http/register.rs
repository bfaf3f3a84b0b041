//! Dynamic client registration endpoints (RFC 7591/7592).
//!
//! `POST /register` creates a client; `GET`/`PUT`/`DELETE` on
//! `/register/{client_id}` manage it, authenticated by the registration
//! access token issued at creation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::{bearer_token, error_response};
use crate::registration::request::RegistrationRequest;
use crate::registration::validator::RegistrationService;

/// State for the registration endpoints.
#[derive(Clone)]
pub struct RegistrationState {
    /// The registration service.
    pub service: Arc<RegistrationService>,
}

impl RegistrationState {
    /// Creates a new registration state.
    #[must_use]
    pub fn new(service: Arc<RegistrationService>) -> Self {
        Self { service }
    }
}

/// `POST /register`
pub async fn register_handler(
    State(state): State<RegistrationState>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    match state.service.register(request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// `GET /register/{client_id}`
pub async fn register_read_handler(
    State(state): State<RegistrationState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.service.read(&client_id, &token).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// `PUT /register/{client_id}`
pub async fn register_update_handler(
    State(state): State<RegistrationState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.service.update(&client_id, &token, request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

/// `DELETE /register/{client_id}`
pub async fn register_delete_handler(
    State(state): State<RegistrationState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.service.delete(&client_id, &token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
