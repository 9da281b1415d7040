//! User and credential records

use std::fmt;

use secrecy::SecretString;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    auth::password::{hash_password, verify_password},
    error::{ApiError, ApiResult},
};

/// A user's password: an optional transient plaintext and the persisted digest
#[derive(Clone, Default)]
pub struct Credential {
    plaintext: Option<SecretString>,
    digest: Vec<u8>,
}

impl Credential {
    /// Hash `plaintext` on the blocking pool and keep the plaintext in memory
    /// for validation.
    pub async fn from_plaintext(plaintext: &str) -> ApiResult<Self> {
        let owned = plaintext.to_string();
        let digest = tokio::task::spawn_blocking(move || hash_password(&owned))
            .await
            .map_err(|e| ApiError::Hashing(e.to_string()))?
            .map_err(|e| ApiError::Hashing(e.to_string()))?;

        Ok(Self {
            plaintext: Some(SecretString::from(plaintext.to_string())),
            digest: digest.into_bytes(),
        })
    }

    /// Wrap a digest loaded from storage
    pub fn from_digest(digest: Vec<u8>) -> Self {
        Self {
            plaintext: None,
            digest,
        }
    }

    pub fn plaintext(&self) -> Option<&SecretString> {
        self.plaintext.as_ref()
    }

    pub fn has_digest(&self) -> bool {
        !self.digest.is_empty()
    }

    /// Digest to write to storage.
    ///
    /// # Panics
    ///
    /// Panics when no digest is present: persisting an empty credential is a
    /// programming error, never a user error.
    pub fn digest_for_storage(&self) -> &[u8] {
        assert!(self.has_digest(), "missing password digest for user");
        &self.digest
    }

    /// Compare a candidate plaintext against the stored digest
    pub async fn matches(&self, plaintext: &str) -> ApiResult<bool> {
        let digest = String::from_utf8(self.digest.clone())
            .map_err(|e| ApiError::Hashing(format!("digest is not utf-8: {e}")))?;
        let candidate = plaintext.to_string();

        tokio::task::spawn_blocking(move || verify_password(&candidate, &digest))
            .await
            .map_err(|e| ApiError::Hashing(e.to_string()))?
            .map_err(|e| ApiError::Hashing(e.to_string()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("plaintext", &self.plaintext.as_ref().map(|_| "[redacted]"))
            .field("digest", &if self.has_digest() { "[redacted]" } else { "<empty>" })
            .finish()
    }
}

/// Persisted user
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub credential: Credential,
    pub activated: bool,
    pub version: i32,
}

/// User about to be inserted; the store assigns id, created_at and version
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub credential: Credential,
    pub activated: bool,
}
