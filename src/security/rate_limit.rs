use crate::AppState;
use crate::clock::{Clock, SystemClock};
use crate::error::AppError;
use crate::sweep::Sweep;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::client_key::client_key;

/// Default interval between idle-bucket sweeps (10 minutes).
pub const DEFAULT_LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Token bucket parameters shared by every client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum balance, and the balance of a fresh bucket.
    pub capacity: f64,
    /// Time to accrue one token.
    pub refill_interval: Duration,
}

impl Default for RateLimitConfig {
    /// 10 tokens, one more every 6 seconds (10 per minute).
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_interval: Duration::from_secs(6),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    /// Balance at `now`, capped at `config.capacity`.
    fn balance_at(&self, now: Instant, config: &RateLimitConfig) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let accrued = elapsed.as_secs_f64() / config.refill_interval.as_secs_f64();
        (self.tokens + accrued).min(config.capacity)
    }
}

/// Per-client token bucket limiter.
///
/// Each client key gets its own bucket, created full on first sight. The
/// balance refills continuously, so fractional tokens carry over between
/// calls.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

#[derive(Debug)]
struct RateLimiterInner {
    buckets: Mutex<HashMap<String, Bucket>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                buckets: Mutex::new(HashMap::new()),
                config,
                clock,
            }),
        }
    }

    /// Try to spend one token for `client_key`.
    ///
    /// Returns `false` when the balance is below one token. Denial is a
    /// normal outcome, not an error.
    pub fn admit(&self, client_key: &str) -> bool {
        let now = self.inner.clock.now();
        let config = &self.inner.config;
        let mut buckets = self.lock();

        let Some(bucket) = buckets.get_mut(client_key) else {
            // First sight: a full bucket, less this request.
            let admitted = config.capacity >= 1.0;
            let tokens = if admitted { config.capacity - 1.0 } else { config.capacity };
            buckets.insert(
                client_key.to_string(),
                Bucket {
                    tokens,
                    last_refill: now,
                },
            );
            return admitted;
        };

        bucket.tokens = bucket.balance_at(now, config);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current balance for `client_key`, if it has a bucket.
    #[must_use]
    pub fn balance(&self, client_key: &str) -> Option<f64> {
        let now = self.inner.clock.now();
        self.lock()
            .get(client_key)
            .map(|b| b.balance_at(now, &self.inner.config))
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every bucket that has refilled to full capacity by `now`.
    ///
    /// A full bucket is treated as idle. This cannot tell a client that just
    /// waited out its burst from one that went away, which is acceptable:
    /// either way a new bucket would start full.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let config = self.inner.config;
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, b| b.balance_at(now, &config) < config.capacity);
        before - buckets.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.inner
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn sweep(&self) -> usize {
        let removed = self.sweep_at(self.inner.clock.now());
        if removed > 0 {
            debug!(name: "rate_limit.swept", removed, remaining = self.len(), "Idle buckets swept");
        }
        removed
    }
}

/// Middleware to enforce rate limits
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let key = client_key(req.headers(), peer, &state.forwarded_headers);

    if state.rate_limiter.admit(&key) {
        return next.run(req).await;
    }

    warn!(name: "rate_limit.denied", client = %key, path = %req.uri().path(), "Rate limit exceeded");
    AppError::RateLimited.render(crate::error::is_htmx(req.headers()))
}
