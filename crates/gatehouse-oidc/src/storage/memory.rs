//! In-memory storage backend.
//!
//! Backs the bundled tests and single-node deployments. Every map is a
//! `DashMap`, so mutations are atomic per entity key: code consumption goes
//! through a single entry lock, which is what serializes concurrent
//! redemptions of the same code.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{
    ClientStorage, CodeRedemption, GrantStorage, PairwiseStorage, SessionStorage, TokenStorage,
};
use crate::types::{
    AccessTokenRecord, AuthorizationCode, AuthorizationGrant, Client, RefreshTokenRecord,
};

/// Concurrent in-memory implementation of every storage trait.
#[derive(Default)]
pub struct MemoryStore {
    clients: DashMap<String, Client>,
    registration_tokens: DashMap<String, String>,
    grants: DashMap<Uuid, AuthorizationGrant>,
    grant_index: DashMap<(String, String, String), Uuid>,
    codes: DashMap<String, AuthorizationCode>,
    access_tokens: DashMap<String, AccessTokenRecord>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    refresh_by_id: DashMap<Uuid, String>,
    sessions: DashMap<String, SessionRecord>,
    pairwise: DashMap<(String, String), String>,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    user_id: String,
    clients: BTreeSet<String>,
    active: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// ClientStorage
// =============================================================================

#[async_trait]
impl ClientStorage for MemoryStore {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn find_by_registration_token(&self, token: &str) -> AuthResult<Option<Client>> {
        let Some(client_id) = self.registration_tokens.get(token).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.find_by_client_id(&client_id).await
    }

    async fn create(&self, client: &Client) -> AuthResult<Client> {
        client
            .validate()
            .map_err(|e| AuthError::invalid_client(e.to_string()))?;
        if self.clients.contains_key(&client.client_id) {
            return Err(AuthError::invalid_client(format!(
                "client {} already exists",
                client.client_id
            )));
        }
        if let Some(ref token) = client.registration_access_token {
            self.registration_tokens
                .insert(token.clone(), client.client_id.clone());
        }
        self.clients
            .insert(client.client_id.clone(), client.clone());
        Ok(client.clone())
    }

    async fn update(&self, client_id: &str, client: &Client) -> AuthResult<Client> {
        client
            .validate()
            .map_err(|e| AuthError::invalid_client(e.to_string()))?;
        if !self.clients.contains_key(client_id) {
            return Err(AuthError::invalid_client(format!(
                "client {client_id} does not exist"
            )));
        }
        self.clients.insert(client_id.to_string(), client.clone());
        Ok(client.clone())
    }

    async fn delete(&self, client_id: &str) -> AuthResult<()> {
        let Some((_, client)) = self.clients.remove(client_id) else {
            return Err(AuthError::invalid_client(format!(
                "client {client_id} does not exist"
            )));
        };
        if let Some(token) = client.registration_access_token {
            self.registration_tokens.remove(&token);
        }
        Ok(())
    }
}

// =============================================================================
// GrantStorage
// =============================================================================

#[async_trait]
impl GrantStorage for MemoryStore {
    async fn find_grant(
        &self,
        client_id: &str,
        user_id: &str,
        session_id: &str,
    ) -> AuthResult<Option<AuthorizationGrant>> {
        let key = (
            client_id.to_string(),
            user_id.to_string(),
            session_id.to_string(),
        );
        let Some(grant_id) = self.grant_index.get(&key).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.grants.get(&grant_id).map(|g| g.clone()))
    }

    async fn get_grant(&self, grant_id: Uuid) -> AuthResult<Option<AuthorizationGrant>> {
        Ok(self.grants.get(&grant_id).map(|g| g.clone()))
    }

    async fn save_grant(&self, grant: &AuthorizationGrant) -> AuthResult<()> {
        let key = (
            grant.client_id.clone(),
            grant.user_id.clone(),
            grant.session_id.clone(),
        );
        self.grant_index.insert(key, grant.grant_id);
        self.grants.insert(grant.grant_id, grant.clone());
        Ok(())
    }

    async fn extend_grant_scope(
        &self,
        grant_id: Uuid,
        scopes: &BTreeSet<String>,
    ) -> AuthResult<AuthorizationGrant> {
        let mut entry = self
            .grants
            .get_mut(&grant_id)
            .ok_or_else(|| AuthError::invalid_grant("grant does not exist"))?;
        entry.scopes.extend(scopes.iter().cloned());
        Ok(entry.clone())
    }

    async fn invalidate_grant(&self, grant_id: Uuid) -> AuthResult<()> {
        if let Some((_, grant)) = self.grants.remove(&grant_id) {
            self.grant_index
                .remove(&(grant.client_id, grant.user_id, grant.session_id));
        }
        Ok(())
    }

    async fn create_code(&self, code: &AuthorizationCode) -> AuthResult<()> {
        self.codes.insert(code.code_hash.clone(), code.clone());
        Ok(())
    }

    async fn consume_code(&self, code_hash: &str) -> AuthResult<CodeRedemption> {
        // The entry lock makes the consumed-check and the mark one atomic
        // step; a concurrent redeemer blocks here and then sees consumed_at.
        let mut entry = self
            .codes
            .get_mut(code_hash)
            .ok_or_else(|| AuthError::invalid_grant("invalid authorization code"))?;
        if entry.consumed_at.is_some() {
            return Ok(CodeRedemption::Replay(entry.clone()));
        }
        entry.consumed_at = Some(OffsetDateTime::now_utc());
        Ok(CodeRedemption::FirstUse(entry.clone()))
    }
}

// =============================================================================
// TokenStorage
// =============================================================================

#[async_trait]
impl TokenStorage for MemoryStore {
    async fn create_access(&self, record: &AccessTokenRecord) -> AuthResult<()> {
        self.access_tokens.insert(record.jti.clone(), record.clone());
        Ok(())
    }

    async fn create_refresh(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        self.refresh_by_id
            .insert(record.id, record.token_hash.clone());
        self.refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_access(&self, jti: &str) -> AuthResult<Option<AccessTokenRecord>> {
        Ok(self.access_tokens.get(jti).map(|r| r.clone()))
    }

    async fn find_refresh_by_hash(
        &self,
        token_hash: &str,
    ) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.get(token_hash).map(|r| r.clone()))
    }

    async fn revoke_access(&self, jti: &str) -> AuthResult<bool> {
        let Some(mut record) = self.access_tokens.get_mut(jti) else {
            return Ok(false);
        };
        if record.revoked_at.is_some() {
            return Ok(false);
        }
        record.revoked_at = Some(OffsetDateTime::now_utc());
        Ok(true)
    }

    async fn revoke_refresh(&self, id: Uuid) -> AuthResult<bool> {
        let Some(hash) = self.refresh_by_id.get(&id).map(|h| h.clone()) else {
            return Ok(false);
        };
        let Some(mut record) = self.refresh_tokens.get_mut(&hash) else {
            return Ok(false);
        };
        if record.revoked_at.is_some() {
            return Ok(false);
        }
        record.revoked_at = Some(OffsetDateTime::now_utc());
        Ok(true)
    }

    async fn revoke_grant_lineage(&self, grant_id: Uuid) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut revoked = 0;
        for mut entry in self.access_tokens.iter_mut() {
            if entry.grant_id == grant_id && entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                revoked += 1;
            }
        }
        for mut entry in self.refresh_tokens.iter_mut() {
            if entry.grant_id == grant_id && entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_code_lineage(&self, code_id: Uuid) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut revoked = 0;
        for mut entry in self.access_tokens.iter_mut() {
            if entry.code_id == Some(code_id) && entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                revoked += 1;
            }
        }
        for mut entry in self.refresh_tokens.iter_mut() {
            if entry.code_id == Some(code_id) && entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_issuance(&self, issuance_id: Uuid) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut revoked = 0;
        for mut entry in self.access_tokens.iter_mut() {
            if entry.issuance_id == issuance_id && entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                revoked += 1;
            }
        }
        for mut entry in self.refresh_tokens.iter_mut() {
            if entry.issuance_id == issuance_id && entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

// =============================================================================
// SessionStorage
// =============================================================================

#[async_trait]
impl SessionStorage for MemoryStore {
    async fn record_participation(
        &self,
        session_id: &str,
        user_id: &str,
        client_id: &str,
    ) -> AuthResult<()> {
        self.sessions
            .entry(session_id.to_string())
            .and_modify(|s| {
                s.clients.insert(client_id.to_string());
            })
            .or_insert_with(|| SessionRecord {
                user_id: user_id.to_string(),
                clients: BTreeSet::from([client_id.to_string()]),
                active: true,
            });
        Ok(())
    }

    async fn is_active(&self, session_id: &str) -> AuthResult<bool> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|s| s.active)
            .unwrap_or(false))
    }

    async fn end_session(&self, session_id: &str) -> AuthResult<Vec<String>> {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return Ok(Vec::new());
        };
        session.active = false;
        tracing::debug!(session_id, user_id = %session.user_id, "session ended");
        Ok(session.clients.iter().cloned().collect())
    }
}

// =============================================================================
// PairwiseStorage
// =============================================================================

#[async_trait]
impl PairwiseStorage for MemoryStore {
    async fn find(&self, sector: &str, user_id: &str) -> AuthResult<Option<String>> {
        Ok(self
            .pairwise
            .get(&(sector.to_string(), user_id.to_string()))
            .map(|s| s.clone()))
    }

    async fn save(&self, sector: &str, user_id: &str, subject: &str) -> AuthResult<()> {
        self.pairwise.insert(
            (sector.to_string(), user_id.to_string()),
            subject.to_string(),
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
