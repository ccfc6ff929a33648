//! Request pacing against OKX per-endpoint ceilings.
//!
//! OKX documents limits per endpoint, counted per account (user id) for
//! private endpoints and per IP for public ones. [`TokenBucketLimiter`] keeps
//! one bucket per (endpoint, account) and callers await
//! [`RateLimit::acquire`] before every request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fanout_telemetry::Metrics;

use crate::api::BoxFuture;

/// Rate-limited REST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    Instruments,
    MaxSize,
    MaxAvailSize,
    Positions,
    SetLeverage,
    BatchOrders,
}

impl Endpoint {
    pub const ALL: [Endpoint; 6] = [
        Endpoint::Instruments,
        Endpoint::MaxSize,
        Endpoint::MaxAvailSize,
        Endpoint::Positions,
        Endpoint::SetLeverage,
        Endpoint::BatchOrders,
    ];

    /// Versioned request path.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Instruments => "/api/v5/public/instruments",
            Self::MaxSize => "/api/v5/account/max-size",
            Self::MaxAvailSize => "/api/v5/account/max-avail-size",
            Self::Positions => "/api/v5/account/positions",
            Self::SetLeverage => "/api/v5/account/set-leverage",
            Self::BatchOrders => "/api/v5/trade/batch-orders",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instruments => "instruments",
            Self::MaxSize => "max-size",
            Self::MaxAvailSize => "max-avail-size",
            Self::Positions => "positions",
            Self::SetLeverage => "set-leverage",
            Self::BatchOrders => "batch-orders",
        }
    }

    /// OKX documented ceiling for this endpoint.
    pub fn default_rule(&self) -> RateRule {
        match self {
            Self::Positions => RateRule::new(10, 2_000),
            Self::BatchOrders => RateRule::new(300, 2_000),
            Self::Instruments | Self::MaxSize | Self::MaxAvailSize | Self::SetLeverage => {
                RateRule::new(20, 2_000)
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `requests` per `per_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRule {
    pub requests: u32,
    pub per_ms: u64,
}

impl RateRule {
    pub const fn new(requests: u32, per_ms: u64) -> Self {
        Self { requests, per_ms }
    }

    fn refill_per_sec(&self) -> f64 {
        f64::from(self.requests.max(1)) * 1000.0 / self.per_ms.max(1) as f64
    }
}

/// Injected pacing collaborator.
pub trait RateLimit: Send + Sync {
    /// Wait until `account` may call `endpoint`. Returns the time waited.
    fn acquire<'a>(&'a self, endpoint: Endpoint, account: &'a str) -> BoxFuture<'a, Duration>;
}

/// Arc wrapper for RateLimit trait objects.
pub type DynRateLimit = Arc<dyn RateLimit>;

/// Limiter that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLimiter;

impl RateLimit for NoopLimiter {
    fn acquire<'a>(&'a self, _endpoint: Endpoint, _account: &'a str) -> BoxFuture<'a, Duration> {
        Box::pin(async { Duration::ZERO })
    }
}

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rule: RateRule) -> Self {
        let capacity = f64::from(rule.requests.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: rule.refill_per_sec(),
            last_refill: Instant::now(),
        }
    }

    /// Take one token, or return how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Token bucket per (endpoint, account).
pub struct TokenBucketLimiter {
    rules: HashMap<Endpoint, RateRule>,
    buckets: DashMap<(Endpoint, String), Arc<Mutex<Bucket>>>,
}

impl TokenBucketLimiter {
    /// Create a limiter using `rules`; endpoints without a rule use OKX defaults.
    pub fn new(rules: HashMap<Endpoint, RateRule>) -> Self {
        Self {
            rules,
            buckets: DashMap::new(),
        }
    }

    /// Limiter with OKX documented ceilings.
    pub fn with_defaults() -> Self {
        Self::new(HashMap::new())
    }

    fn rule(&self, endpoint: Endpoint) -> RateRule {
        self.rules
            .get(&endpoint)
            .copied()
            .unwrap_or_else(|| endpoint.default_rule())
    }

    fn bucket(&self, endpoint: Endpoint, account: &str) -> Arc<Mutex<Bucket>> {
        self.buckets
            .entry((endpoint, account.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(self.rule(endpoint)))))
            .clone()
    }

    /// Number of tracked buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimit for TokenBucketLimiter {
    fn acquire<'a>(&'a self, endpoint: Endpoint, account: &'a str) -> BoxFuture<'a, Duration> {
        Box::pin(async move {
            let bucket = self.bucket(endpoint, account);
            let started = Instant::now();
            loop {
                let outcome = bucket.lock().try_take(Instant::now());
                match outcome {
                    Ok(()) => break,
                    Err(wait) => {
                        debug!(
                            endpoint = %endpoint,
                            wait_ms = wait.as_millis() as u64,
                            "Rate limit reached, waiting"
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
            }
            let waited = started.elapsed();
            Metrics::rate_limit_wait(endpoint.as_str(), waited.as_secs_f64() * 1000.0);
            waited
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        assert_eq!(Endpoint::Positions.default_rule(), RateRule::new(10, 2_000));
        assert_eq!(Endpoint::BatchOrders.default_rule(), RateRule::new(300, 2_000));
        assert_eq!(Endpoint::MaxSize.default_rule().requests, 20);
    }

    #[test]
    fn test_bucket_drains_then_reports_wait() {
        let mut bucket = Bucket::new(RateRule::new(2, 1_000));
        let now = Instant::now();
        assert!(bucket.try_take(now).is_ok());
        assert!(bucket.try_take(now).is_ok());
        let wait = bucket.try_take(now).unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(500));
        assert!(bucket.try_take(now + Duration::from_millis(600)).is_ok());
    }

    #[test]
    fn test_bucket_never_exceeds_capacity() {
        let mut bucket = Bucket::new(RateRule::new(1, 100));
        let later = Instant::now() + Duration::from_secs(60);
        assert!(bucket.try_take(later).is_ok());
        assert!(bucket.try_take(later).is_err());
    }

    #[tokio::test]
    async fn test_buckets_are_per_account_and_endpoint() {
        let limiter = TokenBucketLimiter::new(HashMap::from([(
            Endpoint::SetLeverage,
            RateRule::new(1, 60_000),
        )]));
        let a = limiter.acquire(Endpoint::SetLeverage, "acct-a").await;
        let b = limiter.acquire(Endpoint::SetLeverage, "acct-b").await;
        let c = limiter.acquire(Endpoint::BatchOrders, "acct-a").await;
        assert!(a < Duration::from_millis(50));
        assert!(b < Duration::from_millis(50));
        assert!(c < Duration::from_millis(50));
        assert_eq!(limiter.bucket_count(), 3);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = TokenBucketLimiter::new(HashMap::from([(
            Endpoint::Positions,
            RateRule::new(1, 200),
        )]));
        limiter.acquire(Endpoint::Positions, "acct").await;
        let waited = limiter.acquire(Endpoint::Positions, "acct").await;
        assert!(waited >= Duration::from_millis(150));
    }

    #[test]
    fn test_noop_never_waits() {
        let limiter = NoopLimiter;
        for _ in 0..100 {
            assert_eq!(
                tokio_test::block_on(limiter.acquire(Endpoint::BatchOrders, "acct")),
                Duration::ZERO
            );
        }
    }
}
