//! The Client Registry Validator and registration service.
//!
//! `register` runs the rule pipeline over a registration request (after any
//! software statement overlay), persists the resulting client, and mints
//! the registration management credentials. `read`/`update`/`delete`
//! authenticate the registration access token and operate on one client.
//!
//! Every rule failure is a structured error naming the failing parameter.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use gatehouse_jose::SignatureAlgorithm;

use crate::AuthResult;
use crate::config::ServerConfig;
use crate::error::AuthError;
use crate::oauth::response_type::effective_grant_types;
use crate::registration::request::{RegistrationRequest, RegistrationResponse};
use crate::registration::sector::{RemoteDocumentFetcher, fetch_sector_document};
use crate::registration::software_statement::verify_software_statement;
use crate::storage::ClientStorage;
use crate::types::{
    ApplicationType, Client, LocalizedValue, ResponseType, SubjectType, TokenEndpointAuthMethod,
};

/// ID token signing algorithms this server can actually produce: the RSA
/// families from the RSA key pair, ES384 from the EC key pair, and the HS
/// family from the client secret.
const SIGNABLE_ID_TOKEN_ALGS: &[SignatureAlgorithm] = &[
    SignatureAlgorithm::RS256,
    SignatureAlgorithm::RS384,
    SignatureAlgorithm::RS512,
    SignatureAlgorithm::PS256,
    SignatureAlgorithm::PS384,
    SignatureAlgorithm::PS512,
    SignatureAlgorithm::ES384,
    SignatureAlgorithm::HS256,
    SignatureAlgorithm::HS384,
    SignatureAlgorithm::HS512,
];

/// Dynamic client registration service.
pub struct RegistrationService {
    config: ServerConfig,
    clients: Arc<dyn ClientStorage>,
    fetcher: Arc<dyn RemoteDocumentFetcher>,
}

impl RegistrationService {
    /// Creates a new registration service.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        clients: Arc<dyn ClientStorage>,
        fetcher: Arc<dyn RemoteDocumentFetcher>,
    ) -> Self {
        Self {
            config,
            clients,
            fetcher,
        }
    }

    /// Registers a new client.
    ///
    /// # Errors
    ///
    /// Returns a registration error naming the first failing parameter.
    pub async fn register(&self, request: RegistrationRequest) -> AuthResult<RegistrationResponse> {
        let request = self.apply_software_statement(request).await?;
        let mut client = self.validate(&request, None).await?;

        client.client_id = Uuid::new_v4().to_string();
        client.client_id_issued_at = OffsetDateTime::now_utc();
        client.registration_access_token = Some(generate_opaque_token());
        if client.token_endpoint_auth_method.requires_secret() {
            client.client_secret = Some(generate_opaque_token());
        }

        let created = self.clients.create(&client).await?;
        debug!(client_id = %created.client_id, "client registered");
        Ok(self.response_for(&created))
    }

    /// Reads a registration, authenticated by its access token.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` when the token does not own the client.
    pub async fn read(&self, client_id: &str, token: &str) -> AuthResult<RegistrationResponse> {
        let client = self.authenticate(client_id, token).await?;
        Ok(self.response_for(&client))
    }

    /// Updates a registration, authenticated by its access token. The
    /// client id, secret, and management token are preserved.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` for bad credentials or a registration error
    /// naming the first failing parameter.
    pub async fn update(
        &self,
        client_id: &str,
        token: &str,
        request: RegistrationRequest,
    ) -> AuthResult<RegistrationResponse> {
        let existing = self.authenticate(client_id, token).await?;
        let request = self.apply_software_statement(request).await?;
        let mut client = self.validate(&request, Some(&existing)).await?;

        client.client_id = existing.client_id.clone();
        client.client_id_issued_at = existing.client_id_issued_at;
        client.registration_access_token = existing.registration_access_token.clone();
        client.client_secret = existing.client_secret.clone();
        client.trusted = existing.trusted;

        let updated = self.clients.update(client_id, &client).await?;
        Ok(self.response_for(&updated))
    }

    /// Deletes a registration, authenticated by its access token.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` for bad credentials.
    pub async fn delete(&self, client_id: &str, token: &str) -> AuthResult<()> {
        self.authenticate(client_id, token).await?;
        self.clients.delete(client_id).await
    }

    async fn authenticate(&self, client_id: &str, token: &str) -> AuthResult<Client> {
        let client = self
            .clients
            .find_by_registration_token(token)
            .await?
            .ok_or_else(|| AuthError::invalid_token("unknown registration access token"))?;
        if client.client_id != client_id {
            return Err(AuthError::invalid_token(
                "registration access token does not own this client",
            ));
        }
        Ok(client)
    }

    /// Verifies a software statement, if present, and overlays its claims
    /// onto the top-level request fields.
    async fn apply_software_statement(
        &self,
        request: RegistrationRequest,
    ) -> AuthResult<RegistrationRequest> {
        let Some(statement) = request.software_statement.clone() else {
            return Ok(request);
        };

        let claims = verify_software_statement(
            &statement,
            self.config.registration.trusted_software_jwks.as_ref(),
            self.fetcher.as_ref(),
        )
        .await?;

        let mut merged = serde_json::to_value(&request)
            .map_err(|e| AuthError::internal(e.to_string()))?;
        if let Some(object) = merged.as_object_mut() {
            for (key, value) in claims {
                if key == "iss" || key == "iat" || key == "exp" || key == "jwks_uri" {
                    continue;
                }
                object.insert(key, value);
            }
        }
        let mut overlaid: RegistrationRequest =
            serde_json::from_value(merged).map_err(|_| {
                AuthError::software_statement("statement claims do not form a valid registration")
            })?;
        overlaid.software_statement = Some(statement);
        Ok(overlaid)
    }

    /// The rule pipeline. Produces an unpersisted client with identity
    /// fields left for the caller.
    async fn validate(
        &self,
        request: &RegistrationRequest,
        _existing: Option<&Client>,
    ) -> AuthResult<Client> {
        let application_type = request.application_type.unwrap_or(ApplicationType::Web);
        let subject_type = request.subject_type.unwrap_or(SubjectType::Public);

        if request.redirect_uris.is_empty() {
            return Err(AuthError::registration(
                "redirect_uris",
                "at least one redirect URI is required",
            ));
        }
        for uri in &request.redirect_uris {
            validate_redirect_uri(uri, application_type)?;
        }

        // Empty registration defaults to the code flow.
        let response_types = match &request.response_types {
            Some(set) if !set.is_empty() => set.clone(),
            _ => BTreeSet::from([ResponseType::Code]),
        };
        let grant_types = effective_grant_types(
            &response_types,
            request.grant_types.as_ref().unwrap_or(&BTreeSet::new()),
        );

        let id_token_alg = request
            .id_token_signed_response_alg
            .unwrap_or(SignatureAlgorithm::RS256);
        if id_token_alg == SignatureAlgorithm::None {
            return Err(AuthError::registration(
                "id_token_signed_response_alg",
                "ID tokens must be signed",
            ));
        }
        if !SIGNABLE_ID_TOKEN_ALGS.contains(&id_token_alg) {
            return Err(AuthError::registration(
                "id_token_signed_response_alg",
                format!("{id_token_alg} is not in this server's signing capability set"),
            ));
        }

        if request.id_token_encrypted_response_enc.is_some()
            && request.id_token_encrypted_response_alg.is_none()
        {
            return Err(AuthError::registration(
                "id_token_encrypted_response_enc",
                "an enc value requires an alg value",
            ));
        }
        if let Some(alg) = request.id_token_encrypted_response_alg {
            if alg.is_rsa() && request.jwks.is_none() && request.jwks_uri.is_none() {
                return Err(AuthError::registration(
                    "id_token_encrypted_response_alg",
                    "RSA key transport requires client keys (jwks or jwks_uri)",
                ));
            }
        }

        let auth_method = request
            .token_endpoint_auth_method
            .unwrap_or(TokenEndpointAuthMethod::ClientSecretBasic);
        if auth_method == TokenEndpointAuthMethod::PrivateKeyJwt
            && request.jwks.is_none()
            && request.jwks_uri.is_none()
        {
            return Err(AuthError::registration(
                "token_endpoint_auth_method",
                "private_key_jwt requires client keys (jwks or jwks_uri)",
            ));
        }

        // Pairwise subjects need an unambiguous sector before any token is
        // ever issued.
        if subject_type == SubjectType::Pairwise {
            match &request.sector_identifier_uri {
                None => {
                    let hosts: BTreeSet<String> = request
                        .redirect_uris
                        .iter()
                        .filter_map(|uri| Url::parse(uri).ok())
                        .filter_map(|url| url.host_str().map(str::to_string))
                        .collect();
                    if hosts.len() != 1 {
                        return Err(AuthError::registration(
                            "sector_identifier_uri",
                            "pairwise subject type requires a sector identifier or redirect URIs sharing one host",
                        ));
                    }
                }
                Some(uri) => {
                    let governed = fetch_sector_document(self.fetcher.as_ref(), uri).await?;
                    for redirect in &request.redirect_uris {
                        if !governed.contains(redirect) {
                            return Err(AuthError::registration(
                                "sector_identifier_uri",
                                format!("document does not list redirect URI {redirect}"),
                            ));
                        }
                    }
                }
            }
        }

        let mut client = Client {
            client_id: String::new(),
            client_secret: None,
            client_id_issued_at: OffsetDateTime::now_utc(),
            client_secret_expires_at: 0,
            application_type,
            subject_type,
            sector_identifier_uri: request.sector_identifier_uri.clone(),
            redirect_uris: request.redirect_uris.clone(),
            response_types,
            grant_types,
            token_endpoint_auth_method: auth_method,
            token_endpoint_auth_signing_alg: request.token_endpoint_auth_signing_alg,
            id_token_signed_response_alg: id_token_alg,
            id_token_encrypted_response_alg: request.id_token_encrypted_response_alg,
            id_token_encrypted_response_enc: request.id_token_encrypted_response_enc,
            userinfo_signed_response_alg: request.userinfo_signed_response_alg,
            request_object_signing_alg: request.request_object_signing_alg,
            request_object_encryption_alg: request.request_object_encryption_alg,
            request_object_encryption_enc: request.request_object_encryption_enc,
            jwks: request.jwks.clone(),
            jwks_uri: request.jwks_uri.clone(),
            scopes: request.scope_set(),
            software_statement: request.software_statement.clone(),
            software_id: request.software_id.clone(),
            software_version: request.software_version.clone(),
            registration_access_token: None,
            par_lifetime: request
                .par_lifetime
                .unwrap_or(self.config.registration.default_par_lifetime),
            frontchannel_logout_uri: request.frontchannel_logout_uri.clone(),
            post_logout_redirect_uris: request.post_logout_redirect_uris.clone(),
            client_name: fold_localized(request, "client_name"),
            logo_uri: fold_localized(request, "logo_uri"),
            policy_uri: fold_localized(request, "policy_uri"),
            tos_uri: fold_localized(request, "tos_uri"),
            trusted: false,
        };

        // Software statements may carry these at the top level too.
        if client.software_id.is_none() {
            client.software_id = request
                .extra
                .get("software_id")
                .and_then(|v| v.as_str())
                .map(str::to_string);
        }

        Ok(client)
    }

    /// Builds the response: management credentials plus every effective
    /// metadata field, echoed as registered.
    fn response_for(&self, client: &Client) -> RegistrationResponse {
        RegistrationResponse {
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            client_id_issued_at: client.client_id_issued_at.unix_timestamp(),
            client_secret_expires_at: client.client_secret_expires_at,
            registration_access_token: client
                .registration_access_token
                .clone()
                .unwrap_or_default(),
            registration_client_uri: format!(
                "{}/register/{}",
                self.config.issuer.trim_end_matches('/'),
                client.client_id
            ),
            metadata: client_metadata(client),
        }
    }
}

/// Validates one redirect URI against the scheme policy:
/// https always; http only for loopback hosts; custom schemes only for
/// native clients (the OAuth2-for-Native-Apps exemption).
fn validate_redirect_uri(uri: &str, application_type: ApplicationType) -> AuthResult<()> {
    let url = Url::parse(uri)
        .map_err(|_| AuthError::registration("redirect_uris", format!("{uri} is not a URL")))?;

    match url.scheme() {
        "https" => Ok(()),
        "http" => match url.host_str() {
            Some("localhost") | Some("127.0.0.1") => Ok(()),
            _ => Err(AuthError::registration(
                "redirect_uris",
                format!("{uri} must use https"),
            )),
        },
        _ => {
            if application_type == ApplicationType::Native {
                Ok(())
            } else {
                Err(AuthError::registration(
                    "redirect_uris",
                    format!("custom scheme {uri} requires application_type native"),
                ))
            }
        }
    }
}

/// Folds untagged and `#tag` variants of one metadata family into a
/// [`LocalizedValue`].
fn fold_localized(request: &RegistrationRequest, family: &str) -> LocalizedValue {
    let mut value = LocalizedValue::default();
    for (tag, raw) in request.localized_values(family) {
        value.set(tag, raw);
    }
    value
}

/// Serializes the echoable metadata of a client: every registered field,
/// minus identity/credential fields (carried explicitly in the response)
/// and server-internal flags, with localized families flattened back into
/// `name#tag` keys.
fn client_metadata(client: &Client) -> serde_json::Map<String, serde_json::Value> {
    let mut map = match serde_json::to_value(client) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    for internal in [
        "client_id",
        "client_secret",
        "client_id_issued_at",
        "client_secret_expires_at",
        "registration_access_token",
        "trusted",
        "client_name",
        "logo_uri",
        "policy_uri",
        "tos_uri",
    ] {
        map.remove(internal);
    }
    for (family, value) in [
        ("client_name", &client.client_name),
        ("logo_uri", &client.logo_uri),
        ("policy_uri", &client.policy_uri),
        ("tos_uri", &client.tos_uri),
    ] {
        for (tag, variant) in &value.0 {
            let key = if tag.is_empty() {
                family.to_string()
            } else {
                format!("{family}#{tag}")
            };
            map.insert(key, serde_json::Value::String(variant.clone()));
        }
    }
    map
}

/// A 32-byte random opaque credential (registration access tokens, client
/// secrets).
fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// =============================================================================
// Tests
// =============================================================================
