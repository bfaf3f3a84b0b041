//! # gatehouse-oidc
//!
//! OAuth2/OIDC authorization server protocol engine.
//!
//! This crate provides:
//! - Dynamic client registration with software statement support
//! - The authorization flow state machine (code, implicit, and hybrid
//!   flows across query, fragment, and form_post response modes)
//! - Request object (JWT/JWE) processing
//! - Pairwise subject identifier resolution
//! - The token lifecycle: code redemption with single-use enforcement,
//!   refresh with rotation, RFC 7009 revocation with cascading
//!   invalidation, userinfo, and end-session
//! - Storage traits with a bundled in-memory implementation
//! - Axum HTTP handlers per endpoint
//!
//! ## Overview
//!
//! The engine is a stateless request handler over shared storage: any
//! instance in a fleet may serve any request. User authentication and
//! consent are external collaborators behind the
//! [`oauth::ResourceOwnerAuthenticator`] and [`oauth::ConsentService`]
//! traits. All JOSE work is delegated to the `gatehouse-jose` crate.
//!
//! ## Modules
//!
//! - [`config`] - typed server configuration
//! - [`types`] - clients, grants, codes, token records
//! - [`registration`] - dynamic client registration
//! - [`oauth`] - the authorization endpoint machinery
//! - [`token`] - the token lifecycle
//! - [`storage`] - storage traits and the in-memory store
//! - [`http`] - axum handlers

pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod registration;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{PairwiseIdType, ServerConfig, TokenPolicy};
pub use error::AuthError;
pub use oauth::{
    AuthenticatedUser, AuthorizationRequest, AuthorizationService, ConsentDecision,
    ConsentService, PairwiseSubjectResolver, RequestObjectProcessor,
    ResourceOwnerAuthenticator,
};
pub use registration::{
    HttpDocumentFetcher, RegistrationRequest, RegistrationResponse, RegistrationService,
    RemoteDocumentFetcher,
};
pub use storage::{
    ClientStorage, CodeRedemption, GrantStorage, MemoryStore, PairwiseStorage, SessionStorage,
    TokenStorage,
};
pub use token::{EndSessionService, KeyRing, TokenIssuer, TokenService};
pub use types::{Client, GrantType, ResponseType, SubjectType, TokenEndpointAuthMethod};

/// Type alias for authorization server results.
pub type AuthResult<T> = Result<T, AuthError>;
