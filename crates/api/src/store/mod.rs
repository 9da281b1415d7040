//! Persistence store
//!
//! The auth layer talks to storage only through [`Store`]. [`PgStore`] is the
//! production implementation; [`MemoryStore`] backs the tests.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    auth::{permissions::Permissions, tokens::Scope},
    models::{NewUser, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    EditConflict,
    #[error("a user with this email address already exists")]
    DuplicateEmail,
    #[error("store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persisted half of a token. Never holds the plaintext.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub digest: [u8; 32],
    pub user_id: i64,
    pub expiry: OffsetDateTime,
    pub scope: Scope,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), StoreError>;

    /// Delete every token for (scope, user). Returns the number removed.
    async fn delete_tokens(&self, scope: Scope, user_id: i64) -> Result<u64, StoreError>;

    /// User owning a token with this digest and scope that expires after `now`
    async fn find_user_by_token_digest(
        &self,
        digest: &[u8; 32],
        scope: Scope,
        now: OffsetDateTime,
    ) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn insert_user(&self, user: &NewUser) -> Result<User, StoreError>;

    /// Write `user` if the stored version still equals `user.version`.
    /// Returns the user with its bumped version.
    async fn update_user(&self, user: &User) -> Result<User, StoreError>;

    /// Grant permission codes; already-held codes are ignored
    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;

    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError>;
}

/// Run a store call with an upper bound on how long it may take
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
