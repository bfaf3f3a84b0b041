//! Authorization endpoint handler.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};

use crate::http::error_response;
use crate::oauth::authorize::{AuthorizationRequest, AuthorizeReply};
use crate::oauth::flow::{AuthorizationService, AuthorizeOutcome};

/// State for the authorization endpoint.
#[derive(Clone)]
pub struct AuthorizeState {
    /// The authorization flow service.
    pub service: Arc<AuthorizationService>,
}

impl AuthorizeState {
    /// Creates a new authorize state.
    #[must_use]
    pub fn new(service: Arc<AuthorizationService>) -> Self {
        Self { service }
    }
}

/// `GET /authorize`
pub async fn authorize_handler(
    State(state): State<AuthorizeState>,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    match state.service.authorize(request).await {
        AuthorizeOutcome::Reply(AuthorizeReply::Redirect(url)) => {
            Redirect::to(&url).into_response()
        }
        AuthorizeOutcome::Reply(AuthorizeReply::FormPost(html)) => Html(html).into_response(),
        AuthorizeOutcome::DirectError(err) => error_response(&err).into_response(),
    }
}
