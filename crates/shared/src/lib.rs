#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Greenlight Shared Library
//!
//! Infrastructure shared by the Greenlight crates:
//!
//! - **Database**: connection pool creation and schema migrations
//! - **Rate Limiting**: per-client token buckets with idle-client eviction

pub mod db;
pub mod rate_limit;

pub use db::{create_pool, run_migrations, PoolSettings};
pub use rate_limit::{
    RateLimitConfig, RateLimitResult, RateLimiter, IDLE_CLIENT_TTL, SWEEP_INTERVAL,
};
