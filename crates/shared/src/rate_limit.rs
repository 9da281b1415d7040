//! Per-client rate limiting
//!
//! Every client address gets its own token bucket. All buckets share one
//! capacity (burst) and one refill rate, so there is no per-user tiering.
//!
//! The client map sits behind a single mutex. Critical sections are O(1) and
//! short, which keeps this fine for normal traffic; under very high client
//! cardinality the lock becomes the throughput ceiling, and the map can be
//! sharded by address hash into independently locked segments.
//!
//! Idle clients are purged by a sweeper task (see [`RateLimiter::spawn_sweeper`])
//! so the map cannot grow without bound.

use std::{collections::HashMap, net::IpAddr, sync::Arc, time::Duration};

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

/// Clients with no activity for longer than this are evicted
pub const IDLE_CLIENT_TTL: Duration = Duration::from_secs(3 * 60);

/// How often the sweeper looks for idle clients
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Rate limiter configuration shared by every client
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Refill rate in permits per second
    pub requests_per_second: f64,
    /// Bucket capacity
    pub burst: u32,
    /// When false the limiter is bypassed entirely
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst: 4,
            enabled: true,
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    updated_at: Instant,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: f64::from(config.burst),
            updated_at: now,
        }
    }

    fn try_acquire(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.tokens =
            (self.tokens + elapsed * config.requests_per_second).min(f64::from(config.burst));
        self.updated_at = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Client {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Token bucket rate limiter keyed by client address
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Arc<Mutex<HashMap<IpAddr, Client>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Consume one permit for `addr`, creating its bucket on first sight
    pub async fn check(&self, addr: IpAddr) -> RateLimitResult {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;

        let client = clients.entry(addr).or_insert_with(|| Client {
            bucket: TokenBucket::full(&self.config, now),
            last_seen: now,
        });
        client.last_seen = now;

        if client.bucket.try_acquire(&self.config, now) {
            RateLimitResult::Allowed
        } else {
            RateLimitResult::Limited
        }
    }

    /// Remove every client idle for longer than [`IDLE_CLIENT_TTL`].
    /// Returns the number of evicted clients.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        let before = clients.len();

        clients.retain(|_, client| {
            now.saturating_duration_since(client.last_seen) <= IDLE_CLIENT_TTL
        });

        before - clients.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_tracked(&self, addr: IpAddr) -> bool {
        self.clients.lock().await.contains_key(&addr)
    }

    /// Run [`RateLimiter::sweep`] every [`SWEEP_INTERVAL`] until `shutdown`
    /// flips to true or its sender is dropped.
    pub fn spawn_sweeper(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }

                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = limiter.sweep().await;
                        if evicted > 0 {
                            tracing::debug!(evicted, "Evicted idle rate limiter clients");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Rate limiter sweeper stopped");
        })
    }
}
