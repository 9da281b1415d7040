use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::JsonBody;
use crate::{
    auth::{Scope, Token, AUTHENTICATION_TTL},
    error::{ApiError, ApiResult},
    state::AppState,
    store::{bounded, StoreError},
    validation::{validate_email, validate_password_plaintext, Validator},
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: Token,
}

/// Exchange email and password for an authentication token
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let mut v = Validator::new();
    validate_email(&mut v, &req.email);
    validate_password_plaintext(&mut v, &req.password);
    v.finish()?;

    let user = match bounded(
        state.config.query_timeout,
        state.store.find_user_by_email(&req.email),
    )
    .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !user.credential.matches(&req.password).await? {
        tracing::debug!(user_id = user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(user.id, AUTHENTICATION_TTL, Scope::Authentication)
        .await?;

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
