//! End-to-end tests over the full protocol engine: registration,
//! authorization, redemption, refresh, revocation, userinfo, end-session,
//! all against the in-memory store.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;

use gatehouse_oidc::oauth::authorize::{AuthorizationRequest, AuthorizeReply};
use gatehouse_oidc::oauth::flow::AuthorizeOutcome;
use gatehouse_oidc::oauth::token::TokenRequest;
use gatehouse_oidc::registration::request::RegistrationRequest;
use gatehouse_oidc::token::revocation::{RevocationRequest, TokenTypeHint};
use gatehouse_oidc::{
    AuthError, AuthResult, AuthenticatedUser, AuthorizationService, Client, ClientStorage,
    ConsentDecision, ConsentService, EndSessionService, KeyRing, MemoryStore,
    PairwiseSubjectResolver, RegistrationService, RemoteDocumentFetcher, RequestObjectProcessor,
    ResourceOwnerAuthenticator, ServerConfig, SubjectType, TokenIssuer, TokenService,
};

// =============================================================================
// Collaborator stubs
// =============================================================================

struct StubFetcher {
    documents: HashMap<String, serde_json::Value>,
}

#[async_trait]
impl RemoteDocumentFetcher for StubFetcher {
    async fn fetch_json(&self, uri: &str) -> AuthResult<serde_json::Value> {
        self.documents
            .get(uri)
            .cloned()
            .ok_or_else(|| AuthError::invalid_request(format!("fetch of {uri} failed")))
    }
}

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

    async fn fetch_claims(
        &self,
        _user_id: &str,
        scopes: &BTreeSet<String>,
    ) -> AuthResult<serde_json::Map<String, serde_json::Value>> {
        let mut claims = serde_json::Map::new();
        if scopes.contains("profile") {
            claims.insert("name".to_string(), serde_json::json!("Ada Lovelace"));
        }
        Ok(claims)
    }
}

struct ApproveAll {
    prompts: AtomicUsize,
}

#[async_trait]
impl ConsentService for ApproveAll {
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

// =============================================================================
// Engine fixture
// =============================================================================

struct Engine {
    store: Arc<MemoryStore>,
    registration: RegistrationService,
    authorize: AuthorizationService,
    tokens: Arc<TokenService>,
    end_session: EndSessionService,
    consent: Arc<ApproveAll>,
}

fn engine_with_documents(documents: HashMap<String, serde_json::Value>) -> Engine {
    let config = ServerConfig {
        issuer: "https://auth.example.com".to_string(),
        ..Default::default()
    };
    let store = Arc::new(MemoryStore::new());
    let keys = Arc::new(KeyRing::generate().unwrap());
    let fetcher = Arc::new(StubFetcher { documents });
    let authenticator = Arc::new(StaticAuthenticator);
    let consent = Arc::new(ApproveAll {
        prompts: AtomicUsize::new(0),
    });

    let pairwise = Arc::new(PairwiseSubjectResolver::new(
        config.pairwise.clone(),
        Arc::clone(&store) as Arc<_>,
    ));
    let issuer = Arc::new(TokenIssuer::new(
        config.issuer.clone(),
        config.tokens.clone(),
        Arc::clone(&keys),
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&pairwise),
    ));
    let request_objects = Arc::new(RequestObjectProcessor::new(
        Arc::clone(keys.rsa()),
        Arc::clone(&fetcher) as Arc<_>,
        false,
    ));

    let registration = RegistrationService::new(
        config.clone(),
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&fetcher) as Arc<_>,
    );
    let authorize = AuthorizationService::new(
        config.clone(),
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&issuer),
        request_objects,
        Arc::clone(&authenticator) as Arc<_>,
        Arc::clone(&consent) as Arc<dyn ConsentService>,
    );
    let tokens = Arc::new(TokenService::new(
        Arc::clone(&issuer),
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&authenticator) as Arc<_>,
        Arc::clone(&pairwise),
    ));
    let end_session = EndSessionService::new(
        config.issuer.clone(),
        Arc::clone(&keys),
        Arc::clone(&store) as Arc<_>,
        Arc::clone(&store) as Arc<_>,
    );

    Engine {
        store,
        registration,
        authorize,
        tokens,
        end_session,
        consent,
    }
}

fn engine() -> Engine {
    engine_with_documents(HashMap::new())
}

impl Engine {
    /// Registers a confidential code+refresh client and returns it.
    async fn register_client(&self, redirect_uri: &str) -> Client {
        let request = RegistrationRequest {
            redirect_uris: vec![redirect_uri.to_string()],
            scope: Some("openid profile address email".to_string()),
            ..Default::default()
        };
        let response = self.registration.register(request).await.unwrap();
        self.store
            .find_by_client_id(&response.client_id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Runs the code flow and returns the authorization code.
    async fn obtain_code(&self, client: &Client, scope: &str) -> String {
        let request = AuthorizationRequest {
            response_type: "code".to_string(),
            client_id: client.client_id.clone(),
            redirect_uri: Some(client.redirect_uris[0].clone()),
            scope: Some(scope.to_string()),
            state: Some("state-1".to_string()),
            ..Default::default()
        };
        match self.authorize.authorize(request).await {
            AuthorizeOutcome::Reply(AuthorizeReply::Redirect(url)) => {
                let url = url::Url::parse(&url).unwrap();
                url.query_pairs()
                    .find(|(k, _)| k == "code")
                    .map(|(_, v)| v.into_owned())
                    .expect("redirect carries a code")
            }
            other => panic!("expected code redirect, got {other:?}"),
        }
    }

    /// Redeems a code at the token endpoint.
    async fn redeem(
        &self,
        client: &Client,
        code: &str,
    ) -> AuthResult<gatehouse_oidc::oauth::token::TokenResponse> {
        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            code: Some(code.to_string()),
            redirect_uri: Some(client.redirect_uris[0].clone()),
            ..Default::default()
        };
        self.tokens.exchange_code(&request, client).await
    }
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn registration_roundtrip_preserves_metadata() {
    let engine = engine();
    let request = RegistrationRequest {
        redirect_uris: vec![
            "https://app.example.com/cb".to_string(),
            "https://app.example.com/cb2".to_string(),
        ],
        response_types: Some(BTreeSet::from([
            gatehouse_oidc::ResponseType::Code,
            gatehouse_oidc::ResponseType::IdToken,
        ])),
        id_token_signed_response_alg: Some(gatehouse_jose::SignatureAlgorithm::PS256),
        ..Default::default()
    };
    let created = engine.registration.register(request).await.unwrap();
    let read = engine
        .registration
        .read(&created.client_id, &created.registration_access_token)
        .await
        .unwrap();

    assert_eq!(
        read.metadata["redirect_uris"],
        serde_json::json!(["https://app.example.com/cb", "https://app.example.com/cb2"])
    );
    assert_eq!(
        read.metadata["response_types"],
        serde_json::json!(["code", "id_token"])
    );
    assert_eq!(
        read.metadata["id_token_signed_response_alg"],
        serde_json::json!("PS256")
    );
}

#[tokio::test]
async fn authorization_code_is_single_use_and_replay_revokes_tokens() {
    let engine = engine();
    let client = engine.register_client("https://app.example.com/cb").await;
    let code = engine.obtain_code(&client, "openid profile").await;

    // First redemption succeeds with the full artifact set.
    let response = engine.redeem(&client, &code).await.unwrap();
    assert!(response.id_token.is_some());
    let refresh_token = response.refresh_token.clone().unwrap();

    // The issued tokens work.
    let userinfo = engine.tokens.userinfo(&response.access_token).await.unwrap();
    assert_eq!(userinfo["sub"], serde_json::json!("user-1"));
    assert_eq!(userinfo["name"], serde_json::json!("Ada Lovelace"));

    // Second redemption fails...
    let err = engine.redeem(&client, &code).await.unwrap_err();
    assert_eq!(err.oauth_error_code(), "invalid_grant");

    // ...and every token from the first redemption is dead.
    assert!(engine.tokens.userinfo(&response.access_token).await.is_err());
    let refresh_request = TokenRequest {
        grant_type: "refresh_token".to_string(),
        refresh_token: Some(refresh_token),
        ..Default::default()
    };
    assert!(engine.tokens.refresh(&refresh_request, &client).await.is_err());
}

#[tokio::test]
async fn revoking_refresh_token_cascades_to_access_tokens() {
    let engine = engine();
    let client = engine.register_client("https://app.example.com/cb").await;
    let code = engine.obtain_code(&client, "openid profile").await;
    let response = engine.redeem(&client, &code).await.unwrap();

    engine
        .tokens
        .revoke(
            &RevocationRequest {
                token: response.refresh_token.clone().unwrap(),
                token_type_hint: Some(TokenTypeHint::RefreshToken),
            },
            &client,
        )
        .await
        .unwrap();

    // The sibling access token no longer authorizes userinfo.
    assert!(engine.tokens.userinfo(&response.access_token).await.is_err());
}

#[tokio::test]
async fn revoking_access_token_cascades_to_sibling_refresh_token() {
    let engine = engine();
    let client = engine.register_client("https://app.example.com/cb").await;
    let code = engine.obtain_code(&client, "openid profile").await;
    let response = engine.redeem(&client, &code).await.unwrap();

    engine
        .tokens
        .revoke(
            &RevocationRequest {
                token: response.access_token.clone(),
                token_type_hint: Some(TokenTypeHint::AccessToken),
            },
            &client,
        )
        .await
        .unwrap();

    let refresh_request = TokenRequest {
        grant_type: "refresh_token".to_string(),
        refresh_token: response.refresh_token.clone(),
        ..Default::default()
    };
    assert!(engine.tokens.refresh(&refresh_request, &client).await.is_err());
}

#[tokio::test]
async fn revoking_unknown_token_is_idempotent_success() {
    let engine = engine();
    let client = engine.register_client("https://app.example.com/cb").await;

    // Never-issued token: success, not an error.
    engine
        .tokens
        .revoke(
            &RevocationRequest {
                token: "never-issued".to_string(),
                token_type_hint: None,
            },
            &client,
        )
        .await
        .unwrap();

    // Revoking twice is also a success.
    let code = engine.obtain_code(&client, "openid").await;
    let response = engine.redeem(&client, &code).await.unwrap();
    let request = RevocationRequest {
        token: response.refresh_token.clone().unwrap(),
        token_type_hint: None,
    };
    engine.tokens.revoke(&request, &client).await.unwrap();
    engine.tokens.revoke(&request, &client).await.unwrap();
}

#[tokio::test]
async fn refresh_rotates_and_respects_scope_subsets() {
    let engine = engine();
    let client = engine.register_client("https://app.example.com/cb").await;
    let code = engine.obtain_code(&client, "openid profile").await;
    let response = engine.redeem(&client, &code).await.unwrap();
    let original_refresh = response.refresh_token.clone().unwrap();

    // Narrowing the scope is allowed.
    let narrowed = engine
        .tokens
        .refresh(
            &TokenRequest {
                grant_type: "refresh_token".to_string(),
                refresh_token: Some(original_refresh.clone()),
                scope: Some("openid".to_string()),
                ..Default::default()
            },
            &client,
        )
        .await
        .unwrap();
    assert_eq!(narrowed.scope, "openid");
    let rotated = narrowed.refresh_token.clone().unwrap();
    assert_ne!(rotated, original_refresh);

    // The rotated-out token is spent.
    assert!(
        engine
            .tokens
            .refresh(
                &TokenRequest {
                    grant_type: "refresh_token".to_string(),
                    refresh_token: Some(original_refresh),
                    ..Default::default()
                },
                &client,
            )
            .await
            .is_err()
    );

    // Widening beyond the original grant is refused.
    let err = engine
        .tokens
        .refresh(
            &TokenRequest {
                grant_type: "refresh_token".to_string(),
                refresh_token: Some(rotated),
                scope: Some("openid profile email".to_string()),
                ..Default::default()
            },
            &client,
        )
        .await
        .unwrap_err();
    assert_eq!(err.oauth_error_code(), "invalid_scope");
}

#[tokio::test]
async fn pairwise_subjects_partition_by_sector() {
    let sector_uri = "https://sector.example.com/uris.json";
    let documents = HashMap::from([(
        sector_uri.to_string(),
        serde_json::json!(["https://a.example.com/cb", "https://b.example.com/cb"]),
    )]);
    let engine = engine_with_documents(documents);

    let mut shared_sector_clients = Vec::new();
    for redirect in ["https://a.example.com/cb", "https://b.example.com/cb"] {
        let request = RegistrationRequest {
            redirect_uris: vec![redirect.to_string()],
            subject_type: Some(SubjectType::Pairwise),
            sector_identifier_uri: Some(sector_uri.to_string()),
            scope: Some("openid".to_string()),
            ..Default::default()
        };
        let response = engine.registration.register(request).await.unwrap();
        shared_sector_clients.push(
            engine
                .store
                .find_by_client_id(&response.client_id)
                .await
                .unwrap()
                .unwrap(),
        );
    }

    // A third pairwise client in its own sector (single redirect host).
    let request = RegistrationRequest {
        redirect_uris: vec!["https://c.example.com/cb".to_string()],
        subject_type: Some(SubjectType::Pairwise),
        scope: Some("openid".to_string()),
        ..Default::default()
    };
    let response = engine.registration.register(request).await.unwrap();
    let other_sector_client = engine
        .store
        .find_by_client_id(&response.client_id)
        .await
        .unwrap()
        .unwrap();

    let mut subjects = Vec::new();
    for client in shared_sector_clients.iter().chain([&other_sector_client]) {
        let code = engine.obtain_code(client, "openid").await;
        let response = engine.redeem(client, &code).await.unwrap();
        let userinfo = engine.tokens.userinfo(&response.access_token).await.unwrap();
        subjects.push(userinfo["sub"].as_str().unwrap().to_string());
    }

    // Same sector, same subject; different sector, different subject;
    // never the raw user id.
    assert_eq!(subjects[0], subjects[1]);
    assert_ne!(subjects[0], subjects[2]);
    assert!(subjects.iter().all(|sub| sub != "user-1"));

    // Stable across repeated flows.
    let code = engine.obtain_code(&shared_sector_clients[0], "openid").await;
    let again = engine
        .redeem(&shared_sector_clients[0], &code)
        .await
        .unwrap();
    let userinfo = engine.tokens.userinfo(&again.access_token).await.unwrap();
    assert_eq!(userinfo["sub"].as_str().unwrap(), subjects[0]);
}

#[tokio::test]
async fn scope_accretion_prompts_once_per_new_scope_set() {
    let engine = engine();
    let client = engine.register_client("https://app.example.com/cb").await;

    engine.obtain_code(&client, "openid profile").await;
    assert_eq!(engine.consent.prompts.load(Ordering::SeqCst), 1);

    // Growing the scope set prompts again and succeeds.
    engine
        .obtain_code(&client, "openid profile address email")
        .await;
    assert_eq!(engine.consent.prompts.load(Ordering::SeqCst), 2);

    // Any subset of the approved union goes through silently.
    engine.obtain_code(&client, "profile email").await;
    assert_eq!(engine.consent.prompts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn end_session_invalidates_session_and_lists_logout_uris() {
    let engine = engine();

    let request = RegistrationRequest {
        redirect_uris: vec!["https://app.example.com/cb".to_string()],
        scope: Some("openid".to_string()),
        frontchannel_logout_uri: Some("https://app.example.com/fc-logout".to_string()),
        post_logout_redirect_uris: vec!["https://app.example.com/bye".to_string()],
        ..Default::default()
    };
    let response = engine.registration.register(request).await.unwrap();
    let client = engine
        .store
        .find_by_client_id(&response.client_id)
        .await
        .unwrap()
        .unwrap();

    let code = engine.obtain_code(&client, "openid").await;
    let tokens = engine.redeem(&client, &code).await.unwrap();
    let id_token = tokens.id_token.clone().unwrap();

    let result = engine
        .end_session
        .end_session(&gatehouse_oidc::token::end_session::EndSessionRequest {
            id_token_hint: id_token,
            post_logout_redirect_uri: Some("https://app.example.com/bye".to_string()),
            state: Some("s".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(result.frontchannel_logout_uris.len(), 1);
    assert!(result.frontchannel_logout_uris[0].contains("sid=session-1"));
    assert_eq!(
        result.post_logout_redirect_uri.as_deref(),
        Some("https://app.example.com/bye?state=s")
    );
}
