//! Authentication middleware for Axum
//!
//! [`authenticate`] runs once per request and attaches an [`Identity`]. The
//! gates that follow only read that identity; they never touch the
//! `Authorization` header themselves.

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, VARY},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{
    identity::{identity, ActiveUser, Identity},
    permissions::PermissionService,
    tokens::{validate_plaintext, Scope, TokenService},
};
use crate::{
    error::{ApiError, ApiResult},
    models::User,
};

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub tokens: TokenService,
    pub permissions: PermissionService,
}

fn with_vary(mut response: Response) -> Response {
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// `Ok(None)` means no credentials were offered at all.
fn extract_bearer_token(headers: &HeaderMap) -> ApiResult<Option<&str>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::InvalidAuthentication)?;
    if value.is_empty() {
        return Ok(None);
    }

    match value.split(' ').collect::<Vec<_>>().as_slice() {
        ["Bearer", token] => Ok(Some(*token)),
        _ => Err(ApiError::InvalidAuthentication),
    }
}

async fn resolve_identity(auth: &AuthState, headers: &HeaderMap) -> ApiResult<Identity> {
    let Some(token) = extract_bearer_token(headers)? else {
        return Ok(Identity::Anonymous);
    };
    if !validate_plaintext(token) {
        return Err(ApiError::InvalidAuthentication);
    }

    match auth.tokens.resolve(Scope::Authentication, token).await {
        Ok(user) => Ok(Identity::Authenticated(user)),
        Err(ApiError::NotFound) => Err(ApiError::InvalidAuthentication),
        Err(err) => Err(err),
    }
}

/// Middleware that resolves the caller's identity
pub async fn authenticate(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = resolve_identity(&auth, request.headers()).await;
    match resolved {
        Ok(identity) => {
            if let Identity::Authenticated(user) = &identity {
                tracing::debug!(user_id = user.id, "authenticate: token accepted");
            }
            request.extensions_mut().insert(identity);
            with_vary(next.run(request).await)
        }
        Err(err) => {
            if !err.is_internal() {
                tracing::debug!(
                    path = %request.uri().path(),
                    error = %err,
                    "authenticate: rejected credentials"
                );
            }
            with_vary(err.into_response())
        }
    }
}

pub fn check_authenticated(identity: &Identity) -> ApiResult<&User> {
    identity.user().ok_or(ApiError::AuthenticationRequired)
}

pub fn check_activated(identity: &Identity) -> ApiResult<&User> {
    let user = check_authenticated(identity)?;
    if !user.activated {
        return Err(ApiError::AccountInactive);
    }
    Ok(user)
}

/// Middleware that rejects anonymous callers
pub async fn require_authenticated_user(request: Request, next: Next) -> Response {
    match check_authenticated(identity(request.extensions())) {
        Ok(_) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// Middleware that requires an authenticated, activated account and hands
/// the handler an [`ActiveUser`]
pub async fn require_activated_user(mut request: Request, next: Next) -> Response {
    let active = match check_activated(identity(request.extensions())) {
        Ok(user) => ActiveUser::new(user.clone()),
        Err(err) => return err.into_response(),
    };
    request.extensions_mut().insert(active);
    next.run(request).await
}

/// Middleware that requires an active account holding `code`.
///
/// Bind the code with a closure when layering:
/// `from_fn_with_state(auth, |s, r, n| require_permission("movies:write", s, r, n))`.
pub async fn require_permission(
    code: &'static str,
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match check_activated(identity(request.extensions())) {
        Ok(user) => user.clone(),
        Err(err) => return err.into_response(),
    };

    let permissions = match auth.permissions.all_for(user.id).await {
        Ok(permissions) => permissions,
        Err(err) => return err.into_response(),
    };
    if !permissions.includes(code) {
        tracing::debug!(user_id = user.id, permission = code, "require_permission: denied");
        return ApiError::Forbidden.into_response();
    }

    request.extensions_mut().insert(ActiveUser::new(user));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_no_header_is_anonymous() {
        assert!(matches!(extract_bearer_token(&HeaderMap::new()), Ok(None)));
        assert!(matches!(extract_bearer_token(&headers("")), Ok(None)));
    }

    #[test]
    fn test_header_must_be_exactly_bearer_and_token() {
        for bad in ["Bearer", "Token abc", "bearer abc", "Bearer  abc", "Bearer a b"] {
            assert!(
                matches!(
                    extract_bearer_token(&headers(bad)),
                    Err(ApiError::InvalidAuthentication)
                ),
                "{bad:?} should be rejected"
            );
        }

        let valid = headers("Bearer ABC");
        let token = extract_bearer_token(&valid).unwrap();
        assert_eq!(token, Some("ABC"));
    }
}
