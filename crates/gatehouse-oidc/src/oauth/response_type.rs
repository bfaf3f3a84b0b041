//! Response type sets and the grant-type implication table.
//!
//! Registration and runtime authorization share one rule table:
//!
//! | response types                  | implied grant types                          |
//! |---------------------------------|----------------------------------------------|
//! | `{}` or `{code}`                | `authorization_code`, `refresh_token`        |
//! | `{token}`, `{id_token}`,        | `implicit`                                   |
//! | `{token, id_token}`             |                                              |
//! | any set with `code` + `token`/  | `authorization_code`, `refresh_token`,       |
//! | `id_token`                      | `implicit`                                   |
//!
//! Explicitly requested grant types are unioned with the implied set, never
//! validated against it.

use std::collections::BTreeSet;

use crate::error::AuthError;
use crate::types::client::{GrantType, ResponseType};

/// Parses a space-separated `response_type` parameter into a set.
///
/// # Errors
///
/// Returns `unsupported_response_type` for unknown values and
/// `invalid_request` for an empty parameter.
pub fn parse_response_type_set(raw: &str) -> Result<BTreeSet<ResponseType>, AuthError> {
    let mut set = BTreeSet::new();
    for part in raw.split_whitespace() {
        let rt = match part {
            "code" => ResponseType::Code,
            "token" => ResponseType::Token,
            "id_token" => ResponseType::IdToken,
            other => return Err(AuthError::unsupported_response_type(other)),
        };
        set.insert(rt);
    }
    if set.is_empty() {
        return Err(AuthError::invalid_request("response_type is required"));
    }
    Ok(set)
}

/// Returns `true` if the set issues tokens directly from the authorization
/// endpoint (and therefore defaults to the fragment response mode).
#[must_use]
pub fn issues_tokens_directly(set: &BTreeSet<ResponseType>) -> bool {
    set.contains(&ResponseType::Token) || set.contains(&ResponseType::IdToken)
}

/// The grant types implied by a response type set.
#[must_use]
pub fn implied_grant_types(set: &BTreeSet<ResponseType>) -> BTreeSet<GrantType> {
    let has_code = set.is_empty() || set.contains(&ResponseType::Code);
    let has_implicit = issues_tokens_directly(set);

    let mut implied = BTreeSet::new();
    if has_code {
        implied.insert(GrantType::AuthorizationCode);
        implied.insert(GrantType::RefreshToken);
    }
    if has_implicit {
        implied.insert(GrantType::Implicit);
    }
    implied
}

/// The effective grant type set for a registration: the implied set unioned
/// with whatever the caller explicitly requested.
#[must_use]
pub fn effective_grant_types(
    response_types: &BTreeSet<ResponseType>,
    requested: &BTreeSet<GrantType>,
) -> BTreeSet<GrantType> {
    let mut effective = implied_grant_types(response_types);
    effective.extend(requested.iter().copied());
    effective
}
