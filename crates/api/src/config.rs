//! Server configuration loaded from the environment

use std::{str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use greenlight_shared::{PoolSettings, RateLimitConfig};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4000";
const DEFAULT_ENVIRONMENT: &str = "development";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format {other:?}, expected pretty or json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub environment: String,
    pub database_url: String,
    pub pool: PoolSettings,
    pub limiter: RateLimitConfig,
    /// Upper bound on each store call made while serving a request
    pub query_timeout: Duration,
    /// How long in-flight requests get to finish after a shutdown signal
    pub shutdown_timeout: Duration,
    /// How long shutdown waits for background tasks before abandoning them
    pub drain_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            database_url: String::new(),
            pool: PoolSettings::default(),
            limiter: RateLimitConfig::default(),
            query_timeout: Duration::from_secs(3),
            shutdown_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    /// Returns error if `DATABASE_URL` is unset or a variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;

        let requests_per_second: f64 =
            parse(&get, "LIMITER_RPS")?.unwrap_or(defaults.limiter.requests_per_second);
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(anyhow!(
                "invalid value {requests_per_second} for LIMITER_RPS: expected a positive number"
            ));
        }
        let burst: u32 = parse(&get, "LIMITER_BURST")?.unwrap_or(defaults.limiter.burst);
        if burst == 0 {
            return Err(anyhow!("invalid value 0 for LIMITER_BURST: expected at least 1"));
        }

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            environment: get("ENVIRONMENT").unwrap_or(defaults.environment),
            database_url,
            pool: PoolSettings {
                max_connections: parse(&get, "DB_MAX_CONNECTIONS")?
                    .unwrap_or(defaults.pool.max_connections),
                idle_timeout: parse(&get, "DB_MAX_IDLE_TIME_SECS")?
                    .map_or(defaults.pool.idle_timeout, Duration::from_secs),
                ..defaults.pool
            },
            limiter: RateLimitConfig {
                requests_per_second,
                burst,
                enabled: parse_bool(&get, "LIMITER_ENABLED")?.unwrap_or(defaults.limiter.enabled),
            },
            query_timeout: parse(&get, "QUERY_TIMEOUT_SECS")?
                .map_or(defaults.query_timeout, Duration::from_secs),
            shutdown_timeout: parse(&get, "SHUTDOWN_TIMEOUT_SECS")?
                .map_or(defaults.shutdown_timeout, Duration::from_secs),
            drain_timeout: parse(&get, "DRAIN_TIMEOUT_SECS")?
                .map_or(defaults.drain_timeout, Duration::from_secs),
            log_format: parse(&get, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
        })
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| anyhow!("invalid value {value:?} for {key}: {e}"))
        })
        .transpose()
}

fn parse_bool<G>(get: &G, key: &str) -> Result<Option<bool>>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| match value.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Ok(false),
            other => Err(anyhow!("invalid value {other:?} for {key}: expected a boolean")),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/greenlight")]).unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:4000");
        assert_eq!(config.environment, "development");
        assert_eq!(config.pool.max_connections, 25);
        assert_eq!(config.pool.idle_timeout, Duration::from_secs(900));
        assert_eq!(config.limiter.requests_per_second, 2.0);
        assert_eq!(config.limiter.burst, 4);
        assert!(config.limiter.enabled);
        assert_eq!(config.query_timeout, Duration::from_secs(3));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_database_url_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/greenlight"),
            ("LIMITER_ENABLED", "false"),
            ("LIMITER_RPS", "0.5"),
            ("LIMITER_BURST", "10"),
            ("DRAIN_TIMEOUT_SECS", "2"),
            ("LOG_FORMAT", "JSON"),
            ("ENVIRONMENT", "production"),
        ])
        .unwrap();

        assert!(!config.limiter.enabled);
        assert_eq!(config.limiter.requests_per_second, 0.5);
        assert_eq!(config.limiter.burst, 10);
        assert_eq!(config.drain_timeout, Duration::from_secs(2));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = load(&[("DATABASE_URL", "x"), ("LIMITER_BURST", "lots")]).unwrap_err();
        assert!(err.to_string().contains("LIMITER_BURST"));

        assert!(load(&[("DATABASE_URL", "x"), ("LIMITER_ENABLED", "maybe")]).is_err());
    }

    #[test]
    fn test_unusable_limiter_settings_are_rejected() {
        for rps in ["NaN", "inf", "-inf", "-1", "0"] {
            let err = load(&[("DATABASE_URL", "x"), ("LIMITER_RPS", rps)]).unwrap_err();
            assert!(err.to_string().contains("LIMITER_RPS"), "{rps}: {err}");
        }

        let err = load(&[("DATABASE_URL", "x"), ("LIMITER_BURST", "0")]).unwrap_err();
        assert!(err.to_string().contains("LIMITER_BURST"));

        let err = load(&[("DATABASE_URL", "x"), ("LIMITER_BURST", "-4")]).unwrap_err();
        assert!(err.to_string().contains("LIMITER_BURST"));
    }
}
