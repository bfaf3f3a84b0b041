//! Client authentication for the token, revocation, and end-session
//! endpoints.
//!
//! Methods are tried in priority order: HTTP Basic credentials, body
//! credentials (`client_secret_post`), client assertion JWTs
//! (`client_secret_jwt` / `private_key_jwt`), then public `none` clients.
//! The method actually used must be acceptable for the client's registered
//! `token_endpoint_auth_method`.

use serde::Deserialize;
use sha2::Digest;

use gatehouse_jose::{SignatureAlgorithm, VerificationKey, VerifyOptions, peek_header, verify_jws};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token::TokenRequest;
use crate::storage::ClientStorage;
use crate::types::{Client, TokenEndpointAuthMethod};

/// RFC 7523 client assertion type.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Result of successful client authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// The authenticated client.
    pub client: Client,

    /// The authentication method that succeeded.
    pub auth_method: TokenEndpointAuthMethod,
}

/// Claims carried by a client assertion JWT.
#[derive(Debug, Deserialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

/// Authenticates a client from a token-style request.
///
/// # Arguments
///
/// * `request` - The parsed form body
/// * `basic_auth` - Credentials from an HTTP Basic header, if present
/// * `clients` - Client registry
/// * `issuer` - This server's issuer URL (the expected assertion audience)
///
/// # Errors
///
/// Returns `invalid_client` when no acceptable credentials authenticate.
pub async fn authenticate_client(
    request: &TokenRequest,
    basic_auth: Option<(String, String)>,
    clients: &dyn ClientStorage,
    issuer: &str,
) -> AuthResult<AuthenticatedClient> {
    if let Some((client_id, secret)) = basic_auth {
        let client = lookup(clients, &client_id).await?;
        verify_secret(&client, &secret)?;
        return Ok(AuthenticatedClient {
            client,
            auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
        });
    }

    if let (Some(client_id), Some(secret)) = (&request.client_id, &request.client_secret) {
        let client = lookup(clients, client_id).await?;
        if client.token_endpoint_auth_method == TokenEndpointAuthMethod::ClientSecretBasic {
            return Err(AuthError::invalid_client(
                "client must authenticate with client_secret_basic",
            ));
        }
        verify_secret(&client, secret)?;
        return Ok(AuthenticatedClient {
            client,
            auth_method: TokenEndpointAuthMethod::ClientSecretPost,
        });
    }

    if let Some(assertion) = &request.client_assertion {
        if request.client_assertion_type.as_deref() != Some(JWT_BEARER_ASSERTION_TYPE) {
            return Err(AuthError::invalid_client(
                "unsupported client_assertion_type",
            ));
        }
        return authenticate_assertion(assertion, clients, issuer).await;
    }

    if let Some(client_id) = &request.client_id {
        let client = lookup(clients, client_id).await?;
        if client.token_endpoint_auth_method != TokenEndpointAuthMethod::None {
            return Err(AuthError::invalid_client(
                "confidential client must authenticate",
            ));
        }
        return Ok(AuthenticatedClient {
            client,
            auth_method: TokenEndpointAuthMethod::None,
        });
    }

    Err(AuthError::invalid_client("no client credentials provided"))
}

async fn authenticate_assertion(
    assertion: &str,
    clients: &dyn ClientStorage,
    issuer: &str,
) -> AuthResult<AuthenticatedClient> {
    // The subject names the client; the registration tells us how the
    // assertion must be signed.
    let unverified = peek_unverified_subject(assertion)?;
    let client = lookup(clients, &unverified).await?;

    let header = peek_header(assertion).map_err(|_| {
        AuthError::invalid_client("client assertion is not a well-formed JWT")
    })?;
    let header_alg = SignatureAlgorithm::parse(&header.alg)
        .map_err(|_| AuthError::invalid_client("client assertion algorithm is unknown"))?;
    let alg = client.token_endpoint_auth_signing_alg.unwrap_or(header_alg);
    if alg != header_alg {
        return Err(AuthError::invalid_client(
            "client assertion algorithm does not match registration",
        ));
    }

    let opts = VerifyOptions::default().with_audience(issuer);
    let (claims, method) = match client.token_endpoint_auth_method {
        TokenEndpointAuthMethod::ClientSecretJwt => {
            if !alg.is_symmetric() {
                return Err(AuthError::invalid_client(
                    "client_secret_jwt requires an HS-family algorithm",
                ));
            }
            let secret = client
                .client_secret
                .as_deref()
                .ok_or_else(|| AuthError::invalid_client("client has no secret"))?;
            let claims: AssertionClaims = verify_jws(
                assertion,
                alg,
                &VerificationKey::Secret(secret.as_bytes()),
                &opts,
            )
            .map_err(|_| AuthError::invalid_client("client assertion verification failed"))?;
            (claims, TokenEndpointAuthMethod::ClientSecretJwt)
        }
        TokenEndpointAuthMethod::PrivateKeyJwt => {
            let jwks = client
                .jwks
                .as_ref()
                .ok_or_else(|| AuthError::invalid_client("client registered no JWKS"))?;
            let claims: AssertionClaims =
                verify_jws(assertion, alg, &VerificationKey::Jwks(jwks), &opts)
                    .map_err(|_| {
                        AuthError::invalid_client("client assertion verification failed")
                    })?;
            (claims, TokenEndpointAuthMethod::PrivateKeyJwt)
        }
        other => {
            return Err(AuthError::invalid_client(format!(
                "client assertions not allowed for auth method {other}"
            )));
        }
    };

    if claims.iss != client.client_id || claims.sub != client.client_id {
        return Err(AuthError::invalid_client(
            "client assertion iss/sub must be the client id",
        ));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: method,
    })
}

/// Extracts the `sub` claim without verification, to pick the client whose
/// registration drives verification.
fn peek_unverified_subject(assertion: &str) -> AuthResult<String> {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    let payload = assertion
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::invalid_client("client assertion is not a JWT"))?;
    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::invalid_client("client assertion payload is not base64url"))?;
    let value: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|_| AuthError::invalid_client("client assertion payload is not JSON"))?;
    value
        .get("sub")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuthError::invalid_client("client assertion has no sub"))
}

async fn lookup(clients: &dyn ClientStorage, client_id: &str) -> AuthResult<Client> {
    clients
        .find_by_client_id(client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client(format!("unknown client {client_id}")))
}

fn verify_secret(client: &Client, presented: &str) -> AuthResult<()> {
    let stored = client
        .client_secret
        .as_deref()
        .ok_or_else(|| AuthError::invalid_client("client has no secret"))?;
    if client.client_secret_expires_at != 0
        && client.client_secret_expires_at < time::OffsetDateTime::now_utc().unix_timestamp()
    {
        return Err(AuthError::invalid_client("client secret has expired"));
    }
    // Length-constant comparison over the hashes avoids timing leaks on the
    // secret bytes themselves.
    let stored_hash = sha2::Sha256::digest(stored.as_bytes());
    let presented_hash = sha2::Sha256::digest(presented.as_bytes());
    if stored_hash == presented_hash {
        Ok(())
    } else {
        Err(AuthError::invalid_client("client secret mismatch"))
    }
}

// =============================================================================
// Tests
// =============================================================================
