//! Domain types for the authorization server.

pub mod client;
pub mod grant;
pub mod token;

pub use client::{
    ApplicationType, Client, ClientValidationError, GrantType, LocalizedValue, ResponseType,
    SubjectType, TokenEndpointAuthMethod,
};
pub use grant::{AuthorizationCode, AuthorizationGrant};
pub use token::{AccessTokenRecord, RefreshTokenRecord};
