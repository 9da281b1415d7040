//! In-process [`Store`] used by tests and local experiments

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{Store, StoreError, TokenRecord};
use crate::{
    auth::{permissions::Permissions, tokens::Scope},
    models::{Credential, NewUser, User},
};

/// Codes seeded into the permissions table by the migrations
const KNOWN_PERMISSIONS: &[&str] = &["movies:read", "movies:write"];

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: HashMap<i64, User>,
    tokens: Vec<TokenRecord>,
    permissions: HashMap<i64, HashSet<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        inner.tokens.push(token.clone());
        Ok(())
    }

    async fn delete_tokens(&self, scope: Scope, user_id: i64) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn find_user_by_token_digest(
        &self,
        digest: &[u8; 32],
        scope: Scope,
        now: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let inner = self.inner.read().await;
        let record = inner
            .tokens
            .iter()
            .find(|t| t.scope == scope && t.expiry > now && bool::from(t.digest.ct_eq(digest)))
            .ok_or(StoreError::NotFound)?;

        inner
            .users
            .get(&record.user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let inner = self.inner.read().await;
        inner
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }

        inner.next_id += 1;
        let stored = User {
            id: inner.next_id,
            created_at: OffsetDateTime::now_utc(),
            name: user.name.clone(),
            email: user.email.clone(),
            credential: Credential::from_digest(
                user.credential.digest_for_storage().to_vec(),
            ),
            activated: user.activated,
            version: 1,
        };
        inner.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::DuplicateEmail);
        }

        let current = inner.users.get_mut(&user.id).ok_or(StoreError::EditConflict)?;
        if current.version != user.version {
            return Err(StoreError::EditConflict);
        }

        *current = User {
            credential: Credential::from_digest(
                user.credential.digest_for_storage().to_vec(),
            ),
            version: user.version + 1,
            ..user.clone()
        };
        Ok(current.clone())
    }

    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let held = inner.permissions.entry(user_id).or_default();
        for code in codes.iter().filter(|c| KNOWN_PERMISSIONS.contains(*c)) {
            held.insert(code.to_string());
        }
        Ok(())
    }

    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .permissions
            .get(&user_id)
            .map(|held| held.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Alice".into(),
            email: email.into(),
            credential: Credential::from_digest(b"$argon2id$stub".to_vec()),
            activated: false,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_version() {
        let store = MemoryStore::new();
        let first = store.insert_user(&new_user("a@example.com")).await.unwrap();
        let second = store.insert_user(&new_user("b@example.com")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.insert_user(&new_user("a@example.com")).await.unwrap();

        let result = store.insert_user(&new_user("a@example.com")).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_stale_version_is_edit_conflict() {
        let store = MemoryStore::new();
        let user = store.insert_user(&new_user("a@example.com")).await.unwrap();

        let mut activated = user.clone();
        activated.activated = true;
        let updated = store.update_user(&activated).await.unwrap();
        assert_eq!(updated.version, 2);

        // Second writer still holds version 1
        let result = store.update_user(&activated).await;
        assert!(matches!(result, Err(StoreError::EditConflict)));
    }

    #[tokio::test]
    async fn test_expired_tokens_are_not_found() {
        let store = MemoryStore::new();
        let user = store.insert_user(&new_user("a@example.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();

        store
            .insert_token(&TokenRecord {
                digest: [7; 32],
                user_id: user.id,
                expiry: now,
                scope: Scope::Authentication,
            })
            .await
            .unwrap();

        let result = store
            .find_user_by_token_digest(&[7; 32], Scope::Authentication, now)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_grants_are_idempotent_and_limited_to_known_codes() {
        let store = MemoryStore::new();
        store
            .grant_permissions(1, &["movies:read", "movies:read", "movies:delete"])
            .await
            .unwrap();

        let held = store.permissions_for(1).await.unwrap();
        assert!(held.includes("movies:read"));
        assert!(!held.includes("movies:delete"));
        assert!(store.permissions_for(2).await.unwrap().is_empty());
    }
}
