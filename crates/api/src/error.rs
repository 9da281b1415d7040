//! API error type
//!
//! One enum covers every way a request can fail. Client faults map straight to
//! their status code; internal faults are logged with full context and reach
//! the caller only as a generic 500.

use std::collections::BTreeMap;

use axum::{
    http::{
        header::{HeaderValue, WWW_AUTHENTICATE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid or missing authentication token")]
    InvalidAuthentication,
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,
    #[error("your user account must be activated to access this resource")]
    AccountInactive,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    Forbidden,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("the requested method is not supported for this resource")]
    MethodNotAllowed,
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("{0}")]
    BadRequest(String),
    #[error("failed validation")]
    Validation(BTreeMap<String, String>),
    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),
    #[error("password hashing failure: {0}")]
    Hashing(String),
    #[error("server fault: {0}")]
    ServerFault(String),
}

impl ApiError {
    /// Single-field validation failure
    pub fn field(field: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.to_string());
        ApiError::Validation(fields)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidAuthentication
            | ApiError::AuthenticationRequired
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccountInactive | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Persistence(_) | ApiError::Hashing(_) | ApiError::ServerFault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidAuthentication => "invalid_authentication",
            ApiError::AuthenticationRequired => "authentication_required",
            ApiError::AccountInactive => "account_inactive",
            ApiError::Forbidden => "forbidden",
            ApiError::RateLimitExceeded => "rate_limit_exceeded",
            ApiError::EditConflict => "edit_conflict",
            ApiError::NotFound => "not_found",
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Persistence(_) | ApiError::Hashing(_) | ApiError::ServerFault(_) => {
                "internal_error"
            }
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            other => ApiError::Persistence(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if self.is_internal() {
            tracing::error!(error = ?self, "request failed with internal error");
            "the server encountered a problem and could not process your request".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": self.kind(),
            "message": message,
            "code": status.as_u16(),
        });
        if let ApiError::Validation(fields) = &self {
            body["fields"] = json!(fields);
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InvalidAuthentication.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AuthenticationRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AccountInactive.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::RateLimitExceeded.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::EditConflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::Hashing("bad".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_keep_their_meaning() {
        assert!(matches!(ApiError::from(StoreError::NotFound), ApiError::NotFound));
        assert!(matches!(
            ApiError::from(StoreError::EditConflict),
            ApiError::EditConflict
        ));
        assert!(matches!(
            ApiError::from(StoreError::DuplicateEmail),
            ApiError::Persistence(StoreError::DuplicateEmail)
        ));
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::AuthenticationRequired.into_response();
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let response = ApiError::Forbidden.into_response();
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::ServerFault("digest 0xdeadbeef leaked".into());
        assert_eq!(err.kind(), "internal_error");
        assert!(err.is_internal());
    }
}
