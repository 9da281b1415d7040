#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Greenlight API Library
//!
//! Token authentication, permission gates and per-client rate limiting for
//! the Greenlight HTTP API.

pub mod auth;
pub mod background;
pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod routes;
pub mod security;
pub mod server;
pub mod state;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
