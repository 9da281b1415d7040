//! Request identity
//!
//! The authenticator stores an [`Identity`] in the request extensions for
//! every request it sees. Handlers and later middleware read it back through
//! the extractors defined here.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts, http::Extensions};

use crate::{error::ApiError, models::User};

#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }
}

/// Identity attached by the authenticator.
///
/// # Panics
///
/// Panics if the request never passed through the authenticator. That is a
/// routing bug, not a client error.
pub fn identity(extensions: &Extensions) -> &Identity {
    match extensions.get::<Identity>() {
        Some(identity) => identity,
        None => panic!(
            "missing identity in request extensions; is the authenticate middleware installed?"
        ),
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(identity(&parts.extensions).clone())
    }
}

/// A user that has passed the active-account gate.
///
/// Only the gates in [`super::middleware`] can construct one, so a handler
/// taking `ActiveUser` cannot be reached by an anonymous or inactive caller.
#[derive(Debug, Clone)]
pub struct ActiveUser(User);

impl ActiveUser {
    pub(crate) fn new(user: User) -> Self {
        Self(user)
    }

    pub fn user(&self) -> &User {
        &self.0
    }

    pub fn into_user(self) -> User {
        self.0
    }
}

impl<S> FromRequestParts<S> for ActiveUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ActiveUser>().cloned().ok_or_else(|| {
            ApiError::ServerFault("handler requires an active user but no gate ran".into())
        })
    }
}
