//! Storage traits for authorization server data.
//!
//! This module defines the persistence interfaces for:
//!
//! - Client registrations
//! - Authorization grants and single-use authorization codes
//! - Access and refresh token records
//! - Authentication sessions (for end-session)
//! - Persistent pairwise subject mappings
//!
//! # Atomicity
//!
//! Mutations are atomic per entity key. In particular,
//! [`GrantStorage::consume_code`] must serialize concurrent redemptions of
//! one code so that exactly one caller observes [`CodeRedemption::FirstUse`]
//! and every other observes [`CodeRedemption::Replay`].
//!
//! # Implementations
//!
//! [`memory::MemoryStore`] implements every trait over concurrent maps and
//! backs the bundled tests; database-backed implementations live in
//! separate crates.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{
    AccessTokenRecord, AuthorizationCode, AuthorizationGrant, Client, RefreshTokenRecord,
};

pub use memory::MemoryStore;

// =============================================================================
// Client Storage
// =============================================================================

/// Storage operations for registered clients.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Find a client by its `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Find the client owning a registration access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_registration_token(&self, token: &str) -> AuthResult<Option<Client>>;

    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if a client with the same id exists or the storage
    /// operation fails.
    async fn create(&self, client: &Client) -> AuthResult<Client>;

    /// Update an existing client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client doesn't exist or the storage
    /// operation fails.
    async fn update(&self, client_id: &str, client: &Client) -> AuthResult<Client>;

    /// Delete a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client doesn't exist or the storage
    /// operation fails.
    async fn delete(&self, client_id: &str) -> AuthResult<()>;
}

// =============================================================================
// Grant Storage
// =============================================================================

/// The outcome of an atomic code consumption attempt.
#[derive(Debug, Clone)]
pub enum CodeRedemption {
    /// The code existed and had never been used; it is now consumed.
    FirstUse(AuthorizationCode),

    /// The code was already consumed. The caller must cascade-revoke every
    /// token issued from it.
    Replay(AuthorizationCode),
}

/// Storage operations for authorization grants and codes.
#[async_trait]
pub trait GrantStorage: Send + Sync {
    /// Find the grant for a (client, user, session) triple.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_grant(
        &self,
        client_id: &str,
        user_id: &str,
        session_id: &str,
    ) -> AuthResult<Option<AuthorizationGrant>>;

    /// Get a grant by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_grant(&self, grant_id: Uuid) -> AuthResult<Option<AuthorizationGrant>>;

    /// Create or replace a grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save_grant(&self, grant: &AuthorizationGrant) -> AuthResult<()>;

    /// Atomically union additional scopes onto a grant, returning the
    /// updated record.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant doesn't exist or the storage
    /// operation fails.
    async fn extend_grant_scope(
        &self,
        grant_id: Uuid,
        scopes: &BTreeSet<String>,
    ) -> AuthResult<AuthorizationGrant>;

    /// Remove a grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn invalidate_grant(&self, grant_id: Uuid) -> AuthResult<()>;

    /// Store a freshly issued authorization code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create_code(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Atomically consume a code by its hash. Exactly one concurrent caller
    /// observes [`CodeRedemption::FirstUse`].
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` if no such code exists.
    async fn consume_code(&self, code_hash: &str) -> AuthResult<CodeRedemption>;
}

// =============================================================================
// Token Storage
// =============================================================================

/// Storage operations for issued token records.
///
/// Revocations must be synchronously visible to the next read.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Store an access token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create_access(&self, record: &AccessTokenRecord) -> AuthResult<()>;

    /// Store a refresh token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create_refresh(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    /// Find an access token record by `jti`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_access(&self, jti: &str) -> AuthResult<Option<AccessTokenRecord>>;

    /// Find a refresh token record by token hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_refresh_by_hash(&self, token_hash: &str)
    -> AuthResult<Option<RefreshTokenRecord>>;

    /// Revoke a single access token. Returns `true` if a live token was
    /// revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_access(&self, jti: &str) -> AuthResult<bool>;

    /// Revoke a single refresh token. Returns `true` if a live token was
    /// revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_refresh(&self, id: Uuid) -> AuthResult<bool>;

    /// Revoke every access and refresh token in a grant lineage. Returns
    /// the number of tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_grant_lineage(&self, grant_id: Uuid) -> AuthResult<u64>;

    /// Revoke every token minted from one authorization code. Returns the
    /// number of tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_code_lineage(&self, code_id: Uuid) -> AuthResult<u64>;

    /// Revoke every token from one issuance event (an access token and its
    /// sibling refresh token). Returns the number of tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_issuance(&self, issuance_id: Uuid) -> AuthResult<u64>;
}

// =============================================================================
// Session Storage
// =============================================================================

/// Storage for authentication sessions and the clients participating in
/// them, consumed by end-session.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Record that a client obtained tokens within a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn record_participation(
        &self,
        session_id: &str,
        user_id: &str,
        client_id: &str,
    ) -> AuthResult<()>;

    /// Returns `true` while the session has not been ended.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_active(&self, session_id: &str) -> AuthResult<bool>;

    /// End a session, returning the ids of every participating client.
    /// Ending an unknown session returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn end_session(&self, session_id: &str) -> AuthResult<Vec<String>>;
}

// =============================================================================
// Pairwise Storage
// =============================================================================

/// Storage for persistent pairwise subject mappings.
///
/// Only used when `pairwise.id_type = persistent`; algorithmic derivation
/// needs no storage.
#[async_trait]
pub trait PairwiseStorage: Send + Sync {
    /// Look up a stored subject for a (sector, user) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, sector: &str, user_id: &str) -> AuthResult<Option<String>>;

    /// Store a subject for a (sector, user) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, sector: &str, user_id: &str, subject: &str) -> AuthResult<()>;
}
