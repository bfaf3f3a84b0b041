//! JWKS publication endpoint handler.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use gatehouse_jose::Jwks;

use crate::token::issuer::KeyRing;

/// State for the JWKS endpoint.
#[derive(Clone)]
pub struct JwksState {
    /// The server's key ring.
    pub keys: Arc<KeyRing>,
}

impl JwksState {
    /// Creates a new JWKS state.
    #[must_use]
    pub fn new(keys: Arc<KeyRing>) -> Self {
        Self { keys }
    }
}

/// `GET /jwks`
pub async fn jwks_handler(State(state): State<JwksState>) -> Json<Jwks> {
    Json(state.keys.jwks())
}
