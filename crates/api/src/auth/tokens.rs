//! Activation and authentication tokens
//!
//! A token's plaintext is handed to its owner exactly once, at issuance. Only
//! the SHA-256 digest is persisted, and resolution recomputes the digest from
//! whatever plaintext the client presents.

use std::{fmt, sync::Arc, time::Duration as StdDuration};

use base32::Alphabet;
use rand::{rngs::OsRng, TryRngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::{
    error::{ApiError, ApiResult},
    models::User,
    store::{bounded, Store, TokenRecord},
};

/// Length of an encoded plaintext: 16 random bytes in unpadded base-32
pub const TOKEN_LENGTH: usize = 26;

/// Entropy drawn per token
const TOKEN_BYTES: usize = 16;

pub const ACTIVATION_TTL: Duration = Duration::days(3);
pub const AUTHENTICATION_TTL: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshly issued token. Serializes to `{"token": .., "expiry": ..}`.
#[derive(Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub digest: [u8; 32],
    #[serde(skip)]
    pub user_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    #[serde(skip)]
    pub scope: Scope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Whether `plaintext` has the shape of an issued token
pub fn validate_plaintext(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH
}

pub fn digest_of(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

fn generate_plaintext() -> ApiResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ApiError::ServerFault(format!("entropy source failed: {e}")))?;
    Ok(base32::encode(Alphabet::Rfc4648 { padding: false }, &bytes))
}

/// Issues, resolves and revokes tokens against the store
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn Store>,
    query_timeout: StdDuration,
}

impl TokenService {
    pub fn new(store: Arc<dyn Store>, query_timeout: StdDuration) -> Self {
        Self {
            store,
            query_timeout,
        }
    }

    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: Scope) -> ApiResult<Token> {
        let plaintext = generate_plaintext()?;
        let token = Token {
            digest: digest_of(&plaintext),
            plaintext,
            user_id,
            expiry: OffsetDateTime::now_utc() + ttl,
            scope,
        };

        let record = TokenRecord {
            digest: token.digest,
            user_id,
            expiry: token.expiry,
            scope,
        };
        bounded(self.query_timeout, self.store.insert_token(&record))
            .await
            .map_err(ApiError::Persistence)?;

        tracing::debug!(user_id, scope = %scope, expiry = %token.expiry, "issued token");
        Ok(token)
    }

    /// Owner of a live token. Unknown and expired tokens both yield
    /// [`ApiError::NotFound`].
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> ApiResult<User> {
        self.resolve_at(scope, plaintext, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn resolve_at(
        &self,
        scope: Scope,
        plaintext: &str,
        now: OffsetDateTime,
    ) -> ApiResult<User> {
        if !validate_plaintext(plaintext) {
            return Err(ApiError::NotFound);
        }

        let digest = digest_of(plaintext);
        let user = bounded(
            self.query_timeout,
            self.store.find_user_by_token_digest(&digest, scope, now),
        )
        .await?;
        Ok(user)
    }

    /// Delete every token of `scope` held by `user_id`
    pub async fn revoke_all(&self, scope: Scope, user_id: i64) -> ApiResult<()> {
        let removed = bounded(self.query_timeout, self.store.delete_tokens(scope, user_id))
            .await
            .map_err(ApiError::Persistence)?;
        tracing::debug!(user_id, scope = %scope, removed, "revoked tokens");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Credential, NewUser},
        store::MemoryStore,
    };

    async fn service_with_user() -> (TokenService, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(&NewUser {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                credential: Credential::from_digest(b"$argon2id$stub".to_vec()),
                activated: true,
            })
            .await
            .unwrap();
        (TokenService::new(store, StdDuration::from_secs(3)), user)
    }

    #[tokio::test]
    async fn test_issue_then_resolve() {
        let (tokens, user) = service_with_user().await;
        let token = tokens
            .issue(user.id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .unwrap();

        let resolved = tokens
            .resolve(Scope::Authentication, &token.plaintext)
            .await
            .unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_plaintext_shape() {
        let (tokens, user) = service_with_user().await;
        let token = tokens
            .issue(user.id, ACTIVATION_TTL, Scope::Activation)
            .await
            .unwrap();

        assert_eq!(token.plaintext.len(), TOKEN_LENGTH);
        assert!(token
            .plaintext
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert_eq!(token.digest, digest_of(&token.plaintext));
    }

    #[tokio::test]
    async fn test_wrong_scope_is_not_found() {
        let (tokens, user) = service_with_user().await;
        let token = tokens
            .issue(user.id, ACTIVATION_TTL, Scope::Activation)
            .await
            .unwrap();

        let result = tokens.resolve(Scope::Authentication, &token.plaintext).await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn test_expired_token_is_not_found() {
        let (tokens, user) = service_with_user().await;
        let token = tokens
            .issue(user.id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .unwrap();

        let later = OffsetDateTime::now_utc() + AUTHENTICATION_TTL + Duration::seconds(1);
        let result = tokens
            .resolve_at(Scope::Authentication, &token.plaintext, later)
            .await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn test_revoke_all_removes_every_token_in_scope() {
        let (tokens, user) = service_with_user().await;
        let first = tokens
            .issue(user.id, ACTIVATION_TTL, Scope::Activation)
            .await
            .unwrap();
        let second = tokens
            .issue(user.id, ACTIVATION_TTL, Scope::Activation)
            .await
            .unwrap();
        let session = tokens
            .issue(user.id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .unwrap();

        tokens.revoke_all(Scope::Activation, user.id).await.unwrap();
        // Revoking again with nothing left is fine
        tokens.revoke_all(Scope::Activation, user.id).await.unwrap();

        for plaintext in [&first.plaintext, &second.plaintext] {
            let result = tokens.resolve(Scope::Activation, plaintext).await;
            assert!(matches!(result, Err(ApiError::NotFound)));
        }
        assert!(tokens
            .resolve(Scope::Authentication, &session.plaintext)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_malformed_plaintext_rejected_before_lookup() {
        let (tokens, _) = service_with_user().await;
        let result = tokens.resolve(Scope::Authentication, "short").await;
        assert!(matches!(result, Err(ApiError::NotFound)));
        assert!(!validate_plaintext("ABCDEFGHIJKLMNOPQRSTUVWXYZ2"));
        assert!(validate_plaintext("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    }

    #[tokio::test]
    async fn test_issue_for_unknown_user_is_persistence_failure() {
        let (tokens, _) = service_with_user().await;
        let result = tokens.issue(999, ACTIVATION_TTL, Scope::Activation).await;
        assert!(matches!(result, Err(ApiError::Persistence(_))));
    }

    #[test]
    fn test_debug_and_json_hide_digest() {
        let token = Token {
            plaintext: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".into(),
            digest: [1; 32],
            user_id: 1,
            expiry: OffsetDateTime::UNIX_EPOCH,
            scope: Scope::Authentication,
        };

        assert!(!format!("{token:?}").contains("ABCDEFGH"));
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["token"], "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(json["expiry"], "1970-01-01T00:00:00Z");
        assert!(json.get("digest").is_none());
        assert!(json.get("user_id").is_none());
    }
}
