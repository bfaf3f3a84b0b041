//! The authorization flow state machine.
//!
//! One authorization attempt moves through explicit stages, each a struct
//! whose transition method consumes it and returns the next stage or a
//! failure:
//!
//! ```text
//! Received -> ClientValidated -> UserAuthenticated -> ScopeResolved
//!          -> ConsentDecided -> ArtifactsIssued -> (responded)
//! ```
//!
//! Failures before a redirect URI is trusted surface directly; failures
//! after delivery is negotiated travel through the same response mode a
//! success would have used, carrying `error`, `error_description`, and the
//! original `state`.

use std::collections::BTreeSet;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::AuthError;
use crate::oauth::authorize::{
    AuthorizationRequest, AuthorizeReply, ClaimsRequest, ResponseMode,
};
use crate::oauth::oracle::{
    AuthenticatedUser, ConsentDecision, ConsentService, ResourceOwnerAuthenticator,
};
use crate::oauth::pkce;
use crate::oauth::request_object::RequestObjectProcessor;
use crate::oauth::response_type::{issues_tokens_directly, parse_response_type_set};
use crate::storage::{ClientStorage, GrantStorage, SessionStorage};
use crate::token::issuer::{IdTokenContext, TokenIssuer, join_scopes};
use crate::types::{AuthorizationCode, AuthorizationGrant, Client, ResponseType};

// =============================================================================
// Outcome
// =============================================================================

/// The final outcome of one authorization attempt.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Deliver this reply (success or redirect-carried error).
    Reply(AuthorizeReply),

    /// No redirect URI could be trusted; surface the error directly.
    DirectError(AuthError),
}

/// A failure inside the flow, tagged with whether delivery through the
/// response mode is possible yet.
enum FlowFailure {
    Direct(AuthError),
    Deliverable {
        error: AuthError,
        redirect_uri: String,
        mode: ResponseMode,
        state: Option<String>,
    },
}

type StageResult<T> = Result<T, FlowFailure>;

/// Packs an error for delivery through the trusted redirect.
fn deliverable(
    error: AuthError,
    redirect_uri: &str,
    mode: ResponseMode,
    state: &Option<String>,
) -> FlowFailure {
    FlowFailure::Deliverable {
        error,
        redirect_uri: redirect_uri.to_string(),
        mode,
        state: state.clone(),
    }
}

// =============================================================================
// Stages
// =============================================================================

/// Stage 1: the raw inbound request.
struct Received {
    request: AuthorizationRequest,
}

/// Stage 2: client loaded, request object applied, redirect URI trusted,
/// response types and mode negotiated.
struct ClientValidated {
    client: Client,
    claims_request: Option<ClaimsRequest>,
    response_types: BTreeSet<ResponseType>,
    redirect_uri: String,
    response_mode: ResponseMode,
    state: Option<String>,
    nonce: Option<String>,
    prompt_none: bool,
    scopes_requested: BTreeSet<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
}

/// Stage 3: the resource owner is known.
struct UserAuthenticated {
    validated: ClientValidated,
    user: AuthenticatedUser,
}

/// Stage 4: effective scopes and consent needs are determined.
struct ScopeResolved {
    authenticated: UserAuthenticated,
    scopes: BTreeSet<String>,
    prior_grant: Option<AuthorizationGrant>,
    needs_consent: bool,
}

/// Stage 5: a grant exists covering the approved scopes.
struct ConsentDecided {
    resolved: ScopeResolved,
    grant: AuthorizationGrant,
    scopes: BTreeSet<String>,
}

/// Stage 6: artifacts are minted and ready for delivery.
struct ArtifactsIssued {
    params: Vec<(String, String)>,
    redirect_uri: String,
    response_mode: ResponseMode,
}

// =============================================================================
// Service
// =============================================================================

/// The Authorization Grant Issuer: drives one request through the stages.
pub struct AuthorizationService {
    config: ServerConfig,
    clients: Arc<dyn ClientStorage>,
    grants: Arc<dyn GrantStorage>,
    sessions: Arc<dyn SessionStorage>,
    issuer: Arc<TokenIssuer>,
    request_objects: Arc<RequestObjectProcessor>,
    authenticator: Arc<dyn ResourceOwnerAuthenticator>,
    consent: Arc<dyn ConsentService>,
}

impl AuthorizationService {
    /// Creates a new authorization service.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        clients: Arc<dyn ClientStorage>,
        grants: Arc<dyn GrantStorage>,
        sessions: Arc<dyn SessionStorage>,
        issuer: Arc<TokenIssuer>,
        request_objects: Arc<RequestObjectProcessor>,
        authenticator: Arc<dyn ResourceOwnerAuthenticator>,
        consent: Arc<dyn ConsentService>,
    ) -> Self {
        Self {
            config,
            clients,
            grants,
            sessions,
            issuer,
            request_objects,
            authenticator,
            consent,
        }
    }

    /// Runs one authorization attempt to completion.
    pub async fn authorize(&self, request: AuthorizationRequest) -> AuthorizeOutcome {
        let received = Received { request };
        let outcome = async {
            let validated = self.validate_client(received).await?;
            let authenticated = self.authenticate(validated).await?;
            let resolved = self.resolve_scopes(authenticated).await?;
            let decided = self.decide_consent(resolved).await?;
            let issued = self.issue_artifacts(decided).await?;
            self.respond(issued)
        }
        .await;

        match outcome {
            Ok(reply) => AuthorizeOutcome::Reply(reply),
            Err(FlowFailure::Direct(error)) => AuthorizeOutcome::DirectError(error),
            Err(FlowFailure::Deliverable {
                error,
                redirect_uri,
                mode,
                state,
            }) => {
                let mut params = vec![
                    ("error".to_string(), error.oauth_error_code().to_string()),
                    ("error_description".to_string(), error.to_string()),
                ];
                if let Some(state) = state {
                    params.push(("state".to_string(), state));
                }
                match AuthorizeReply::deliver(mode, &redirect_uri, &params) {
                    Ok(reply) => AuthorizeOutcome::Reply(reply),
                    Err(err) => AuthorizeOutcome::DirectError(err),
                }
            }
        }
    }

    /// `Received -> ClientValidated`.
    async fn validate_client(&self, stage: Received) -> StageResult<ClientValidated> {
        let request = stage.request;

        let client = self
            .clients
            .find_by_client_id(&request.client_id)
            .await
            .map_err(FlowFailure::Direct)?
            .ok_or_else(|| {
                FlowFailure::Direct(AuthError::invalid_client(format!(
                    "unknown client {}",
                    request.client_id
                )))
            })?;

        // Trust the redirect URI before anything can be delivered through
        // it. A single registered URI may be implied.
        let redirect_uri = match &request.redirect_uri {
            Some(uri) => uri.clone(),
            None if client.redirect_uris.len() == 1 => client.redirect_uris[0].clone(),
            None => {
                return Err(FlowFailure::Direct(AuthError::invalid_request(
                    "redirect_uri is required",
                )));
            }
        };
        if !client.is_redirect_uri_allowed(&redirect_uri) {
            return Err(FlowFailure::Direct(AuthError::invalid_request(
                "redirect_uri is not registered",
            )));
        }

        // From here on, errors can travel through the redirect. Request
        // object failures are exactly such errors.
        let state = request.state.clone();
        let (request, claims_request) = self
            .request_objects
            .apply(request, &client)
            .await
            .map_err(|error| deliverable(error, &redirect_uri, ResponseMode::Query, &state))?;

        // The object may override the redirect URI, but only onto another
        // registered one.
        let redirect_uri = match &request.redirect_uri {
            Some(uri) if client.is_redirect_uri_allowed(uri) => uri.clone(),
            Some(_) => {
                return Err(FlowFailure::Direct(AuthError::invalid_request(
                    "redirect_uri is not registered",
                )));
            }
            None => redirect_uri,
        };
        let state = request.state.clone();

        let response_types = parse_response_type_set(&request.response_type)
            .map_err(|error| deliverable(error, &redirect_uri, ResponseMode::Query, &state))?;
        let tokens_directly = issues_tokens_directly(&response_types);
        let default_mode = ResponseMode::default_for(tokens_directly);

        if !client.allows_response_types(&response_types) {
            return Err(deliverable(
                AuthError::unsupported_response_type(request.response_type.clone()),
                &redirect_uri,
                default_mode,
                &state,
            ));
        }

        let response_mode = match request.response_mode.as_deref() {
            None => default_mode,
            Some(raw) => {
                let mode = ResponseMode::parse(raw)
                    .map_err(|error| deliverable(error, &redirect_uri, default_mode, &state))?;
                if !mode.is_compatible(tokens_directly) {
                    return Err(deliverable(
                        AuthError::invalid_request(
                            "response_mode query cannot carry tokens",
                        ),
                        &redirect_uri,
                        default_mode,
                        &state,
                    ));
                }
                mode
            }
        };

        if let Some(ref method) = request.code_challenge_method {
            pkce::validate_challenge_method(method)
                .map_err(|error| deliverable(error, &redirect_uri, response_mode, &state))?;
        }

        // OIDC: implicit/hybrid ID tokens need a nonce for replay
        // protection.
        if response_types.contains(&ResponseType::IdToken) && request.nonce.is_none() {
            return Err(deliverable(
                AuthError::invalid_request("nonce is required for id_token response types"),
                &redirect_uri,
                response_mode,
                &state,
            ));
        }

        let prompt_none = request
            .prompt
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|v| v == "none"));

        debug!(client_id = %client.client_id, ?response_types, "client validated");
        Ok(ClientValidated {
            scopes_requested: request.scope_set(),
            nonce: request.nonce.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method.clone(),
            client,
            claims_request,
            response_types,
            redirect_uri,
            response_mode,
            state,
            prompt_none,
        })
    }

    /// `ClientValidated -> UserAuthenticated`.
    async fn authenticate(&self, stage: ClientValidated) -> StageResult<UserAuthenticated> {
        let fail = |error: AuthError, stage: &ClientValidated| FlowFailure::Deliverable {
            error,
            redirect_uri: stage.redirect_uri.clone(),
            mode: stage.response_mode,
            state: stage.state.clone(),
        };

        // Reconstruct just enough of the request for the oracle.
        let probe = AuthorizationRequest {
            client_id: stage.client.client_id.clone(),
            prompt: stage.prompt_none.then(|| "none".to_string()),
            ..Default::default()
        };
        let user = self
            .authenticator
            .authenticate(&probe)
            .await
            .map_err(|error| fail(error, &stage))?;

        match user {
            Some(user) => Ok(UserAuthenticated {
                validated: stage,
                user,
            }),
            None => Err(fail(AuthError::LoginRequired, &stage)),
        }
    }

    /// `UserAuthenticated -> ScopeResolved`.
    async fn resolve_scopes(&self, stage: UserAuthenticated) -> StageResult<ScopeResolved> {
        let validated = &stage.validated;
        let fail = |error: AuthError| FlowFailure::Deliverable {
            error,
            redirect_uri: validated.redirect_uri.clone(),
            mode: validated.response_mode,
            state: validated.state.clone(),
        };

        let scopes = validated
            .client
            .allowed_scopes(&validated.scopes_requested);
        if scopes.is_empty() {
            return Err(fail(AuthError::invalid_scope(
                "no requested scope is registered for this client",
            )));
        }

        let prior_grant = self
            .grants
            .find_grant(
                &validated.client.client_id,
                &stage.user.user_id,
                &stage.user.session_id,
            )
            .await
            .map_err(|e| fail(e))?;

        // Consent is needed only for scopes beyond the persisted grant;
        // a subset of previously granted scope rides the existing grant.
        let covered = prior_grant
            .as_ref()
            .is_some_and(|grant| grant.covers(&scopes));
        let needs_consent = if validated.client.trusted {
            false
        } else {
            !covered
        };

        if validated.prompt_none && needs_consent {
            return Err(fail(AuthError::ConsentRequired));
        }

        Ok(ScopeResolved {
            authenticated: stage,
            scopes,
            prior_grant,
            needs_consent,
        })
    }

    /// `ScopeResolved -> ConsentDecided`.
    async fn decide_consent(&self, stage: ScopeResolved) -> StageResult<ConsentDecided> {
        let validated = &stage.authenticated.validated;
        let fail = |error: AuthError| FlowFailure::Deliverable {
            error,
            redirect_uri: validated.redirect_uri.clone(),
            mode: validated.response_mode,
            state: validated.state.clone(),
        };

        let approved = if stage.needs_consent {
            match self
                .consent
                .request_consent(&validated.client, &stage.authenticated.user, &stage.scopes)
                .await
                .map_err(|e| fail(e))?
            {
                ConsentDecision::Approved(approved) => {
                    approved.intersection(&stage.scopes).cloned().collect()
                }
                ConsentDecision::Denied => {
                    return Err(fail(AuthError::access_denied(
                        "resource owner denied the request",
                    )));
                }
            }
        } else {
            stage.scopes.clone()
        };

        // Reuse and extend the durable grant rather than recreating it.
        let grant = match &stage.prior_grant {
            Some(prior) => {
                if approved.is_subset(&prior.scopes) {
                    prior.clone()
                } else {
                    self.grants
                        .extend_grant_scope(prior.grant_id, &approved)
                        .await
                        .map_err(|e| fail(e))?
                }
            }
            None => {
                let grant = AuthorizationGrant::new(
                    validated.client.client_id.clone(),
                    stage.authenticated.user.user_id.clone(),
                    stage.authenticated.user.session_id.clone(),
                    approved.clone(),
                );
                self.grants.save_grant(&grant).await.map_err(|e| fail(e))?;
                grant
            }
        };

        Ok(ConsentDecided {
            resolved: stage,
            grant,
            scopes: approved,
        })
    }

    /// `ConsentDecided -> ArtifactsIssued`.
    async fn issue_artifacts(&self, stage: ConsentDecided) -> StageResult<ArtifactsIssued> {
        let validated = &stage.resolved.authenticated.validated;
        let user = &stage.resolved.authenticated.user;
        let fail = |error: AuthError| FlowFailure::Deliverable {
            error,
            redirect_uri: validated.redirect_uri.clone(),
            mode: validated.response_mode,
            state: validated.state.clone(),
        };

        let mut params: Vec<(String, String)> = Vec::new();
        let issuance_id = Uuid::new_v4();

        let code_plain = if validated.response_types.contains(&ResponseType::Code) {
            let plain = AuthorizationCode::generate_code();
            let now = OffsetDateTime::now_utc();
            let lifetime = Duration::seconds(
                self.config.tokens.authorization_code_lifetime.as_secs() as i64,
            );
            let code = AuthorizationCode {
                code_id: Uuid::new_v4(),
                code_hash: AuthorizationCode::hash_code(&plain),
                client_id: validated.client.client_id.clone(),
                grant_id: stage.grant.grant_id,
                user_id: user.user_id.clone(),
                session_id: user.session_id.clone(),
                redirect_uri: validated.redirect_uri.clone(),
                scopes: stage.scopes.clone(),
                nonce: validated.nonce.clone(),
                code_challenge: validated.code_challenge.clone(),
                code_challenge_method: validated.code_challenge_method.clone(),
                claims_request: validated.claims_request.clone(),
                created_at: now,
                expires_at: now + lifetime,
                consumed_at: None,
            };
            self.grants.create_code(&code).await.map_err(|e| fail(e))?;
            params.push(("code".to_string(), plain.clone()));
            Some(plain)
        } else {
            None
        };

        let access_token = if validated.response_types.contains(&ResponseType::Token) {
            let (token, _) = self
                .issuer
                .issue_access_token(
                    &validated.client,
                    stage.grant.grant_id,
                    Some(&user.user_id),
                    Some(&user.session_id),
                    &stage.scopes,
                    issuance_id,
                    None,
                )
                .await
                .map_err(|e| fail(e))?;
            params.push(("access_token".to_string(), token.clone()));
            params.push(("token_type".to_string(), "Bearer".to_string()));
            params.push((
                "expires_in".to_string(),
                self.config.tokens.access_token_lifetime.as_secs().to_string(),
            ));
            params.push(("scope".to_string(), join_scopes(&stage.scopes)));
            Some(token)
        } else {
            None
        };

        if validated.response_types.contains(&ResponseType::IdToken) {
            let id_token = self
                .issuer
                .issue_id_token(
                    &validated.client,
                    IdTokenContext {
                        user_id: &user.user_id,
                        session_id: Some(&user.session_id),
                        auth_time: Some(user.auth_time),
                        nonce: validated.nonce.as_deref(),
                        claims_request: validated.claims_request.as_ref(),
                        access_token: access_token.as_deref(),
                        code: code_plain.as_deref(),
                    },
                )
                .await
                .map_err(|e| fail(e))?;
            params.push(("id_token".to_string(), id_token));
        }

        if let Some(ref state) = validated.state {
            params.push(("state".to_string(), state.clone()));
        }

        self.sessions
            .record_participation(
                &user.session_id,
                &user.user_id,
                &validated.client.client_id,
            )
            .await
            .map_err(|e| fail(e))?;

        debug!(
            client_id = %validated.client.client_id,
            grant_id = %stage.grant.grant_id,
            "artifacts issued"
        );
        Ok(ArtifactsIssued {
            params,
            redirect_uri: validated.redirect_uri.clone(),
            response_mode: validated.response_mode,
        })
    }

    /// `ArtifactsIssued -> responded`.
    fn respond(&self, stage: ArtifactsIssued) -> StageResult<AuthorizeReply> {
        AuthorizeReply::deliver(stage.response_mode, &stage.redirect_uri, &stage.params)
            .map_err(FlowFailure::Direct)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthResult;
    use crate::config::{PairwiseConfig, PairwiseIdType, ServerConfig};
    use crate::oauth::pairwise::PairwiseSubjectResolver;
    use crate::registration::sector::StubFetcher;
    use crate::storage::MemoryStore;
    use crate::token::issuer::KeyRing;
    use crate::types::client::make_web_client;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticAuthenticator;

    #[async_trait]
    impl ResourceOwnerAuthenticator for StaticAuthenticator {
        async fn authenticate(
            &self,
            _request: &AuthorizationRequest,
        ) -> AuthResult<Option<AuthenticatedUser>> {
            Ok(Some(AuthenticatedUser {
                user_id: "user-1".to_string(),
                session_id: "session-1".to_string(),
                auth_time: OffsetDateTime::now_utc(),
            }))
        }
    }

    struct NobodyAuthenticator;

    #[async_trait]
    impl ResourceOwnerAuthenticator for NobodyAuthenticator {
        async fn authenticate(
            &self,
            _request: &AuthorizationRequest,
        ) -> AuthResult<Option<AuthenticatedUser>> {
            Ok(None)
        }
    }

    /// Approves everything and counts how often it was asked.
    struct CountingConsent {
        prompts: AtomicUsize,
    }

    impl CountingConsent {
        fn new() -> Self {
            Self {
                prompts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ConsentService for CountingConsent {
        async fn request_consent(
            &self,
            _client: &Client,
            _user: &AuthenticatedUser,
            scopes: &BTreeSet<String>,
        ) -> AuthResult<ConsentDecision> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            Ok(ConsentDecision::Approved(scopes.clone()))
        }
    }

    struct Fixture {
        service: AuthorizationService,
        store: Arc<MemoryStore>,
        consent: Arc<CountingConsent>,
    }

    async fn fixture_with(
        authenticator: Arc<dyn ResourceOwnerAuthenticator>,
        client: Client,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(KeyRing::generate().unwrap());
        let config = ServerConfig {
            issuer: "https://auth.example.com".to_string(),
            ..Default::default()
        };
        let pairwise = Arc::new(PairwiseSubjectResolver::new(
            PairwiseConfig {
                id_type: PairwiseIdType::Algorithmic,
                salt: "flow-test-salt".to_string(),
            },
            Arc::clone(&store) as Arc<_>,
        ));
        let issuer = Arc::new(TokenIssuer::new(
            config.issuer.clone(),
            config.tokens.clone(),
            Arc::clone(&keys),
            Arc::clone(&store) as Arc<_>,
            pairwise,
        ));
        let request_objects = Arc::new(RequestObjectProcessor::new(
            Arc::clone(keys.rsa()),
            Arc::new(StubFetcher::new()),
            false,
        ));
        let consent = Arc::new(CountingConsent::new());

        store.create(&client).await.unwrap();

        Fixture {
            service: AuthorizationService::new(
                config,
                Arc::clone(&store) as Arc<_>,
                Arc::clone(&store) as Arc<_>,
                Arc::clone(&store) as Arc<_>,
                issuer,
                request_objects,
                authenticator,
                Arc::clone(&consent) as Arc<dyn ConsentService>,
            ),
            store,
            consent,
        }
    }

    fn code_request() -> AuthorizationRequest {
        AuthorizationRequest {
            response_type: "code".to_string(),
            client_id: "test-client".to_string(),
            redirect_uri: Some("https://app.example.com/callback".to_string()),
            scope: Some("openid profile".to_string()),
            state: Some("af0ifjsldkj".to_string()),
            ..Default::default()
        }
    }

    fn redirect_of(outcome: AuthorizeOutcome) -> String {
        match outcome {
            AuthorizeOutcome::Reply(AuthorizeReply::Redirect(url)) => url,
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_code_flow_defaults_to_query_mode() {
        let f = fixture_with(Arc::new(StaticAuthenticator), make_web_client()).await;
        let url = redirect_of(f.service.authorize(code_request()).await);

        assert!(url.starts_with("https://app.example.com/callback?"));
        assert!(url.contains("code="));
        assert!(url.contains("state=af0ifjsldkj"));
        assert!(!url.contains('#'));
    }

    #[tokio::test]
    async fn test_token_flow_defaults_to_fragment_mode() {
        let mut client = make_web_client();
        client.response_types =
            BTreeSet::from([ResponseType::Code, ResponseType::Token, ResponseType::IdToken]);
        let f = fixture_with(Arc::new(StaticAuthenticator), client).await;

        let mut request = code_request();
        request.response_type = "token".to_string();
        let url = redirect_of(f.service.authorize(request).await);

        let (_, fragment) = url.split_once('#').expect("fragment expected");
        assert!(fragment.contains("access_token="));
        assert!(fragment.contains("token_type=Bearer"));
        assert!(fragment.contains("state=af0ifjsldkj"));
    }

    #[tokio::test]
    async fn test_hybrid_flow_carries_code_and_id_token_hashes() {
        let mut client = make_web_client();
        client.response_types =
            BTreeSet::from([ResponseType::Code, ResponseType::IdToken, ResponseType::Token]);
        let f = fixture_with(Arc::new(StaticAuthenticator), client).await;

        let mut request = code_request();
        request.response_type = "code id_token token".to_string();
        request.nonce = Some("n-0S6_WzA2Mj".to_string());
        let url = redirect_of(f.service.authorize(request).await);

        let (_, fragment) = url.split_once('#').expect("fragment expected");
        assert!(fragment.contains("code="));
        assert!(fragment.contains("access_token="));
        assert!(fragment.contains("id_token="));
    }

    #[tokio::test]
    async fn test_unregistered_response_type_redirects_error() {
        let f = fixture_with(Arc::new(StaticAuthenticator), make_web_client()).await;
        let mut request = code_request();
        request.response_type = "token".to_string();
        let url = redirect_of(f.service.authorize(request).await);

        // Registered code-only; token flow errors arrive on the fragment.
        let (_, fragment) = url.split_once('#').expect("fragment expected");
        assert!(fragment.contains("error=unsupported_response_type"));
        assert!(fragment.contains("state=af0ifjsldkj"));
    }

    #[tokio::test]
    async fn test_form_post_mode_keeps_params_in_body() {
        let f = fixture_with(Arc::new(StaticAuthenticator), make_web_client()).await;
        let mut request = code_request();
        request.response_mode = Some("form_post".to_string());

        match f.service.authorize(request).await {
            AuthorizeOutcome::Reply(AuthorizeReply::FormPost(html)) => {
                assert!(html.contains("name=\"code\""));
                assert!(html.contains("name=\"state\" value=\"af0ifjsldkj\""));
            }
            other => panic!("expected form post, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_mode_refused_for_token_flows() {
        let mut client = make_web_client();
        client.response_types = BTreeSet::from([ResponseType::Token]);
        let f = fixture_with(Arc::new(StaticAuthenticator), client).await;

        let mut request = code_request();
        request.response_type = "token".to_string();
        request.response_mode = Some("query".to_string());
        let url = redirect_of(f.service.authorize(request).await);
        let (_, fragment) = url.split_once('#').expect("fragment expected");
        assert!(fragment.contains("error=invalid_request"));
    }

    #[tokio::test]
    async fn test_unknown_client_is_direct_error() {
        let f = fixture_with(Arc::new(StaticAuthenticator), make_web_client()).await;
        let mut request = code_request();
        request.client_id = "nobody".to_string();
        match f.service.authorize(request).await {
            AuthorizeOutcome::DirectError(err) => {
                assert!(matches!(err, AuthError::InvalidClient { .. }));
            }
            other => panic!("expected direct error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unregistered_redirect_is_direct_error() {
        let f = fixture_with(Arc::new(StaticAuthenticator), make_web_client()).await;
        let mut request = code_request();
        request.redirect_uri = Some("https://evil.example.com/cb".to_string());
        match f.service.authorize(request).await {
            AuthorizeOutcome::DirectError(err) => {
                assert!(matches!(err, AuthError::InvalidRequest { .. }));
            }
            other => panic!("expected direct error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prompt_none_without_grant_fails_with_consent_required() {
        let f = fixture_with(Arc::new(StaticAuthenticator), make_web_client()).await;
        let mut request = code_request();
        request.prompt = Some("none".to_string());
        let url = redirect_of(f.service.authorize(request).await);
        assert!(url.contains("error=consent_required"));
        assert_eq!(f.consent.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompt_none_with_existing_grant_succeeds() {
        let f = fixture_with(Arc::new(StaticAuthenticator), make_web_client()).await;

        // First pass establishes the grant with consent.
        let url = redirect_of(f.service.authorize(code_request()).await);
        assert!(url.contains("code="));
        assert_eq!(f.consent.prompts.load(Ordering::SeqCst), 1);

        // prompt=none now sails through without a prompt.
        let mut request = code_request();
        request.prompt = Some("none".to_string());
        let url = redirect_of(f.service.authorize(request).await);
        assert!(url.contains("code="));
        assert_eq!(f.consent.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_user_yields_login_required() {
        let f = fixture_with(Arc::new(NobodyAuthenticator), make_web_client()).await;
        let url = redirect_of(f.service.authorize(code_request()).await);
        assert!(url.contains("error=login_required"));
        assert!(url.contains("state=af0ifjsldkj"));
    }

    #[tokio::test]
    async fn test_scope_accretion_reprompts_only_for_new_scopes() {
        let mut client = make_web_client();
        client.scopes = BTreeSet::from([
            "openid".to_string(),
            "profile".to_string(),
            "address".to_string(),
            "email".to_string(),
        ]);
        let f = fixture_with(Arc::new(StaticAuthenticator), client).await;

        // {openid, profile} prompts once.
        redirect_of(f.service.authorize(code_request()).await);
        assert_eq!(f.consent.prompts.load(Ordering::SeqCst), 1);

        // Growing to {openid, profile, address, email} prompts again...
        let mut request = code_request();
        request.scope = Some("openid profile address email".to_string());
        let url = redirect_of(f.service.authorize(request).await);
        assert!(url.contains("code="));
        assert_eq!(f.consent.prompts.load(Ordering::SeqCst), 2);

        // ...and the grant accreted rather than being replaced.
        let grant = f.store.find_grant("test-client", "user-1", "session-1").await
            .unwrap()
            .unwrap();
        assert_eq!(grant.scopes.len(), 4);

        // A subset of the approved union no longer prompts.
        let mut request = code_request();
        request.scope = Some("openid address".to_string());
        let url = redirect_of(f.service.authorize(request).await);
        assert!(url.contains("code="));
        assert_eq!(f.consent.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_trusted_client_skips_consent() {
        let mut client = make_web_client();
        client.trusted = true;
        let f = fixture_with(Arc::new(StaticAuthenticator), client).await;

        let url = redirect_of(f.service.authorize(code_request()).await);
        assert!(url.contains("code="));
        assert_eq!(f.consent.prompts.load(Ordering::SeqCst), 0);

        // Even prompt=none works without any prior grant.
        let mut request = code_request();
        request.prompt = Some("none".to_string());
        let url = redirect_of(f.service.authorize(request).await);
        assert!(url.contains("code="));
    }

    #[tokio::test]
    async fn test_id_token_without_nonce_rejected() {
        let mut client = make_web_client();
        client.response_types = BTreeSet::from([ResponseType::IdToken]);
        let f = fixture_with(Arc::new(StaticAuthenticator), client).await;

        let mut request = code_request();
        request.response_type = "id_token".to_string();
        let url = redirect_of(f.service.authorize(request).await);
        let (_, fragment) = url.split_once('#').expect("fragment expected");
        assert!(fragment.contains("error=invalid_request"));
    }
}
