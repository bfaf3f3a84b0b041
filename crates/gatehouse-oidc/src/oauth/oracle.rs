//! Resource owner authentication and consent collaborators.
//!
//! Both are external decision oracles invoked synchronously during the
//! authorization flow. The engine never sees credentials or consent UI;
//! it only consumes the decisions.

use std::collections::BTreeSet;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::oauth::authorize::AuthorizationRequest;
use crate::types::Client;

/// The authenticated resource owner, as reported by the authentication
/// collaborator.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Stable user identifier.
    pub user_id: String,

    /// The authentication session identifier.
    pub session_id: String,

    /// When the user last actively authenticated.
    pub auth_time: OffsetDateTime,
}

/// Resource owner authentication service.
#[async_trait]
pub trait ResourceOwnerAuthenticator: Send + Sync {
    /// Resolves the current user for an authorization request.
    ///
    /// Returns `None` when no user is authenticated; the flow then fails
    /// with `login_required` (prompt=none) or denies the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the collaborator itself fails.
    async fn authenticate(
        &self,
        request: &AuthorizationRequest,
    ) -> AuthResult<Option<AuthenticatedUser>>;

    /// Fetches profile claims for a user, filtered by granted scopes.
    /// Used when assembling userinfo responses and ID token claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the collaborator itself fails.
    async fn fetch_claims(
        &self,
        _user_id: &str,
        _scopes: &BTreeSet<String>,
    ) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
        Ok(serde_json::Map::new())
    }
}

/// The outcome of a consent interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentDecision {
    /// The user approved this subset of the prompted scopes.
    Approved(BTreeSet<String>),

    /// The user denied the request.
    Denied,
}

/// Authorization/consent service.
#[async_trait]
pub trait ConsentService: Send + Sync {
    /// Prompts the user to approve the given scopes for the client and
    /// returns the approved subset.
    ///
    /// # Errors
    ///
    /// Returns an error if the collaborator itself fails.
    async fn request_consent(
        &self,
        client: &Client,
        user: &AuthenticatedUser,
        scopes: &BTreeSet<String>,
    ) -> AuthResult<ConsentDecision>;
}
