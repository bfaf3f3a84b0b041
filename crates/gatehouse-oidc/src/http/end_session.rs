//! End-session endpoint handler.
//!
//! Renders a logout page embedding every relying party's front-channel
//! logout URI as a hidden iframe, then (if requested and registered)
//! redirects to the post-logout URI.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};

use crate::http::error_response;
use crate::token::end_session::{EndSessionRequest, EndSessionService};

/// State for the end-session endpoint.
#[derive(Clone)]
pub struct EndSessionState {
    /// The end-session service.
    pub service: Arc<EndSessionService>,
}

impl EndSessionState {
    /// Creates a new end-session state.
    #[must_use]
    pub fn new(service: Arc<EndSessionService>) -> Self {
        Self { service }
    }
}

/// `GET /end_session`
pub async fn end_session_handler(
    State(state): State<EndSessionState>,
    Query(request): Query<EndSessionRequest>,
) -> Response {
    match state.service.end_session(&request).await {
        Ok(result) => {
            if result.frontchannel_logout_uris.is_empty() {
                if let Some(uri) = result.post_logout_redirect_uri {
                    return Redirect::to(&uri).into_response();
                }
            }
            Html(render_logout_page(
                &result.frontchannel_logout_uris,
                result.post_logout_redirect_uri.as_deref(),
            ))
            .into_response()
        }
        Err(err) => error_response(&err).into_response(),
    }
}

fn render_logout_page(logout_uris: &[String], post_logout: Option<&str>) -> String {
    let mut frames = String::new();
    for uri in logout_uris {
        frames.push_str(&format!(
            "<iframe style=\"display:none\" src=\"{}\"></iframe>\n",
            html_escape(uri)
        ));
    }
    let continue_link = post_logout
        .map(|uri| format!("<a href=\"{}\">Continue</a>\n", html_escape(uri)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Signed Out</title></head>\n<body>\n\
         <p>You have been signed out.</p>\n{frames}{continue_link}</body>\n</html>\n"
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
