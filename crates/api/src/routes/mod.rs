//! HTTP routes

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{authenticate, require_activated_user},
    error::ApiError,
    security::{handle_panic, rate_limit},
    state::AppState,
};

pub mod health;
pub mod tokens;
pub mod users;

/// JSON request body whose rejection renders as an [`ApiError`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Build the application router.
///
/// Requests pass, outermost first: request id, tracing, panic guard, rate
/// limiter, authenticator, then any per-route gate.
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let active_only = Router::new()
        .route("/v1/users/me", get(users::show_current_user))
        .route_layer(middleware::from_fn(require_activated_user));

    Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token),
        )
        .merge(active_only)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(auth_state, authenticate))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
