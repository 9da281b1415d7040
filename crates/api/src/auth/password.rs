//! Password hashing with Argon2id
//!
//! The work factor is pinned here and cannot be tuned per call, so every
//! verification costs the same.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Memory cost in KiB
const MEMORY_COST_KIB: u32 = 19 * 1024;
/// Number of passes over memory
const ITERATIONS: u32 = 2;
/// Degree of parallelism
const LANES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password digest is malformed: {0}")]
    MalformedDigest(String),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_COST_KIB, ITERATIONS, LANES, None)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password into a PHC-formatted digest
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = hasher()?
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(digest.to_string())
}

/// Check a plaintext password against a stored digest.
///
/// A mismatch is `Ok(false)`; only a structurally invalid digest is an error.
pub fn verify_password(plaintext: &str, digest: &str) -> Result<bool, PasswordError> {
    let parsed =
        PasswordHash::new(digest).map_err(|e| PasswordError::MalformedDigest(e.to_string()))?;

    match hasher()?.verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::MalformedDigest(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let digest = hash_password("pa55word-correct").unwrap();
        assert!(verify_password("pa55word-correct", &digest).unwrap());
    }

    #[test]
    fn test_mismatch_is_false_not_error() {
        let digest = hash_password("pa55word-correct").unwrap();
        assert!(!verify_password("pa55word-wrong", &digest).unwrap());
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let first = hash_password("pa55word").unwrap();
        let second = hash_password("pa55word").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("pa55word", &first).unwrap());
        assert!(verify_password("pa55word", &second).unwrap());
    }

    #[test]
    fn test_digest_uses_pinned_params() {
        let digest = hash_password("pa55word").unwrap();
        assert!(digest.starts_with("$argon2id$v=19$m=19456,t=2,p=1$"), "{digest}");
    }

    #[test]
    fn test_malformed_digest_is_error() {
        let result = verify_password("pa55word", "not-a-phc-string");
        assert!(matches!(result, Err(PasswordError::MalformedDigest(_))));
    }
}
