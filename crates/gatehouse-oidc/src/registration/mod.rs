//! Dynamic client registration (RFC 7591 / OIDC Registration 1.0).
//!
//! - [`request`] - registration request/response shapes
//! - [`sector`] - remote document fetching (sector identifier docs, JWKS)
//! - [`software_statement`] - software statement verification
//! - [`validator`] - the rule pipeline and registration service

pub mod request;
pub mod sector;
pub mod software_statement;
pub mod validator;

pub use request::{RegistrationRequest, RegistrationResponse};
pub use sector::{HttpDocumentFetcher, RemoteDocumentFetcher};
pub use validator::RegistrationService;
