//! OAuth 2.0 / OIDC authorization endpoint machinery.
//!
//! - [`authorize`] - request/response types and response-mode delivery
//! - [`response_type`] - response-type sets and the grant-type implication table
//! - [`flow`] - the authorization state machine
//! - [`request_object`] - `request` parameter (JWT/JWE) processing
//! - [`pairwise`] - subject identifier resolution
//! - [`pkce`] - PKCE challenge verification
//! - [`client_auth`] - token endpoint client authentication
//! - [`oracle`] - resource owner authentication and consent collaborators
//! - [`token`] - token endpoint request/response types

pub mod authorize;
pub mod client_auth;
pub mod flow;
pub mod oracle;
pub mod pairwise;
pub mod pkce;
pub mod request_object;
pub mod response_type;
pub mod token;

pub use authorize::{
    AuthorizationRequest, AuthorizeReply, ClaimRequestEntry, ClaimsRequest, ResponseMode,
};
pub use client_auth::{AuthenticatedClient, authenticate_client};
pub use flow::{AuthorizationService, AuthorizeOutcome};
pub use oracle::{AuthenticatedUser, ConsentDecision, ConsentService, ResourceOwnerAuthenticator};
pub use pairwise::PairwiseSubjectResolver;
pub use request_object::RequestObjectProcessor;
pub use token::{TokenRequest, TokenResponse};
