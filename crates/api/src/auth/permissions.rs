//! Capability codes held by users

use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    error::{ApiError, ApiResult},
    store::{bounded, Store},
};

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Unordered set of permission codes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    /// Exact membership test
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for Permissions {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn Store>,
    query_timeout: Duration,
}

impl PermissionService {
    pub fn new(store: Arc<dyn Store>, query_timeout: Duration) -> Self {
        Self {
            store,
            query_timeout,
        }
    }

    /// Current permission set, loaded fresh on every call
    pub async fn all_for(&self, user_id: i64) -> ApiResult<Permissions> {
        bounded(self.query_timeout, self.store.permissions_for(user_id))
            .await
            .map_err(ApiError::Persistence)
    }

    /// Grant `codes`; codes the user already holds are skipped
    pub async fn grant(&self, user_id: i64, codes: &[&str]) -> ApiResult<()> {
        bounded(
            self.query_timeout,
            self.store.grant_permissions(user_id, codes),
        )
        .await
        .map_err(ApiError::Persistence)
    }
}
