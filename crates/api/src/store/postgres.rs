//! PostgreSQL implementation of [`Store`]

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::{Store, StoreError, TokenRecord};
use crate::{
    auth::{permissions::Permissions, tokens::Scope},
    models::{Credential, NewUser, User},
};

const USERS_EMAIL_KEY: &str = "users_email_key";

/// Database row type for the users table
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    created_at: OffsetDateTime,
    name: String,
    email: String,
    password_hash: Vec<u8>,
    activated: bool,
    version: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            created_at: row.created_at,
            name: row.name,
            email: row.email,
            credential: Credential::from_digest(row.password_hash),
            activated: row.activated,
            version: row.version,
        }
    }
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    err.as_database_error().and_then(|db| db.constraint()) == Some(constraint)
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.digest[..])
        .bind(token.user_id)
        .bind(token.expiry)
        .bind(token.scope.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_tokens(&self, scope: Scope, user_id: i64) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    async fn find_user_by_token_digest(
        &self,
        digest: &[u8; 32],
        scope: Scope,
        now: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT users.id, users.created_at, users.name, users.email,
                   users.password_hash, users.activated, users.version
            FROM users
            INNER JOIN tokens ON users.id = tokens.user_id
            WHERE tokens.hash = $1
              AND tokens.scope = $2
              AND tokens.expiry > $3
            "#,
        )
        .bind(&digest[..])
        .bind(scope.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, created_at, name, email, password_hash, activated, version
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, name, email, password_hash, activated, version
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.credential.digest_for_storage())
        .bind(user.activated)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, USERS_EMAIL_KEY) {
                StoreError::DuplicateEmail
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(row.into())
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let version: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4,
                version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.credential.digest_for_storage())
        .bind(user.activated)
        .bind(user.id)
        .bind(user.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, USERS_EMAIL_KEY) {
                StoreError::DuplicateEmail
            } else {
                StoreError::Database(e)
            }
        })?;

        let version = version.ok_or(StoreError::EditConflict)?;
        Ok(User {
            version,
            ..user.clone()
        })
    }

    async fn grant_permissions(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let codes: Vec<String> = codes.iter().map(|code| code.to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO users_permissions (user_id, permission_id)
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(codes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes.into_iter().collect())
    }
}
