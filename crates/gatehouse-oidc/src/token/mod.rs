//! Token lifecycle: issuance, redemption, refresh, revocation, end-session.

pub mod end_session;
pub mod issuer;
pub mod revocation;
pub mod service;

pub use end_session::{EndSessionRequest, EndSessionResult, EndSessionService};
pub use issuer::{AccessTokenClaims, IdTokenClaims, IdTokenContext, KeyRing, TokenIssuer};
pub use revocation::{RevocationRequest, TokenTypeHint};
pub use service::{TokenService, UserInfoReply};
