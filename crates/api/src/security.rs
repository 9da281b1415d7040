//! Panic containment and per-client rate limiting

use std::{any::Any, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header::CONNECTION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use greenlight_shared::{RateLimitResult, RateLimiter};

use crate::error::ApiError;

/// Turn a panic caught by `CatchPanicLayer` into a generic 500 and close the
/// connection it happened on.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = ApiError::ServerFault(format!("request handler panicked: {detail}"))
        .into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Rate limiting middleware keyed on the peer address of the connection
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let addr = match ConnectInfo::<SocketAddr>::from_request_parts(&mut parts, &()).await {
        Ok(ConnectInfo(addr)) => addr,
        Err(rejection) => {
            return ApiError::ServerFault(format!(
                "client address unavailable for rate limiting: {rejection}"
            ))
            .into_response();
        }
    };
    let request = Request::from_parts(parts, body);

    match limiter.check(addr.ip()).await {
        RateLimitResult::Allowed => next.run(request).await,
        RateLimitResult::Limited => {
            tracing::debug!(client = %addr.ip(), "rate limit exceeded");
            ApiError::RateLimitExceeded.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use greenlight_shared::RateLimitConfig;
    use tower::ServiceExt;

    fn limited_router(enabled: bool) -> Router {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 2.0,
            burst: 2,
            enabled,
        });
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(limiter, rate_limit))
    }

    async fn status_of(app: &Router) -> StatusCode {
        app.clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_mock_peer_address_is_limited() {
        let app = limited_router(true).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 1))));
        assert_eq!(status_of(&app).await, StatusCode::OK);
        assert_eq!(status_of(&app).await, StatusCode::OK);
        assert_eq!(status_of(&app).await, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_real_connect_info_extension_is_used() {
        let app = limited_router(true);
        let addr = SocketAddr::from(([10, 0, 0, 8], 1));
        for expected in [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
            let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_missing_address_is_server_fault() {
        assert_eq!(
            status_of(&limited_router(true)).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_disabled_limiter_skips_address_lookup() {
        let app = limited_router(false);
        for _ in 0..5 {
            assert_eq!(status_of(&app).await, StatusCode::OK);
        }
    }

    #[test]
    fn test_panic_response_is_generic_500() {
        let response = handle_panic(Box::new("secret internals"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");
    }

    #[test]
    fn test_panic_with_formatted_message() {
        let response = handle_panic(Box::new(format!("index {} out of range", 3)));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
