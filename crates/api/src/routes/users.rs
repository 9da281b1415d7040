//! User registration, activation and profile routes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::JsonBody;
use crate::{
    auth::{ActiveUser, Scope, ACTIVATION_TTL, MOVIES_READ},
    email::welcome_email,
    error::{ApiError, ApiResult},
    models::{Credential, NewUser, User},
    state::AppState,
    store::{bounded, StoreError},
    validation::{
        validate_email, validate_name, validate_password_plaintext, validate_token_plaintext,
        Validator,
    },
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

/// Create an inactive account and mail its activation token
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let mut v = Validator::new();
    validate_name(&mut v, &req.name);
    validate_email(&mut v, &req.email);
    validate_password_plaintext(&mut v, &req.password);
    v.finish()?;

    let new_user = NewUser {
        name: req.name,
        email: req.email,
        credential: Credential::from_plaintext(&req.password).await?,
        activated: false,
    };

    let user = match bounded(
        state.config.query_timeout,
        state.store.insert_user(&new_user),
    )
    .await
    {
        Ok(user) => user,
        Err(StoreError::DuplicateEmail) => {
            return Err(ApiError::field(
                "email",
                "a user with this email address already exists",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    state.permissions.grant(user.id, &[MOVIES_READ]).await?;

    let token = state
        .tokens
        .issue(user.id, ACTIVATION_TTL, Scope::Activation)
        .await?;

    let mailer = state.mailer.clone();
    let email = welcome_email(&user, &token.plaintext);
    state
        .background
        .spawn("welcome_email", async move { mailer.send(&email).await });

    tracing::info!(user_id = user.id, "registered user");
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

/// Activate the account owning an activation token
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActivateRequest>,
) -> ApiResult<Json<UserResponse>> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &req.token);
    v.finish()?;

    let mut user = match state.tokens.resolve(Scope::Activation, &req.token).await {
        Ok(user) => user,
        Err(ApiError::NotFound) => {
            return Err(ApiError::field(
                "token",
                "invalid or expired activation token",
            ));
        }
        Err(e) => return Err(e),
    };

    user.activated = true;
    let user = bounded(state.config.query_timeout, state.store.update_user(&user)).await?;

    state.tokens.revoke_all(Scope::Activation, user.id).await?;

    tracing::info!(user_id = user.id, "activated user");
    Ok(Json(UserResponse { user }))
}

pub async fn show_current_user(active: ActiveUser) -> Json<UserResponse> {
    Json(UserResponse {
        user: active.into_user(),
    })
}
