//! Application state

use std::sync::Arc;

use greenlight_shared::RateLimiter;

use crate::{
    auth::{AuthState, PermissionService, TokenService},
    background::Background,
    config::Config,
    email::{LogMailer, Mailer},
    store::Store,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
    pub permissions: PermissionService,
    /// Per-client request throttling, shared by every connection
    pub rate_limiter: RateLimiter,
    /// Tasks that must finish before the process exits
    pub background: Background,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        Self::with_mailer(config, store, Arc::new(LogMailer))
    }

    pub fn with_mailer(config: Config, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        let tokens = TokenService::new(store.clone(), config.query_timeout);
        let permissions = PermissionService::new(store.clone(), config.query_timeout);
        let rate_limiter = RateLimiter::new(config.limiter);

        Self {
            config,
            store,
            tokens,
            permissions,
            rate_limiter,
            background: Background::new(),
            mailer,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            tokens: self.tokens.clone(),
            permissions: self.permissions.clone(),
        }
    }
}
