//! Bounded retry for idempotent reads.
//!
//! Only instrument, max-size and position reads go through [`with_retry`].
//! Leverage and order submission are never retried: a duplicate execution is
//! worse than a failed attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fanout_telemetry::Metrics;

use crate::error::ExchangeResult;

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_jitter() -> bool {
    true
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Add ±25% random jitter to each delay.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    fn delay_for(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << retry.min(16))
            .min(self.max_delay_ms);

        let millis = if self.jitter && exp > 0 {
            let spread = exp / 4;
            rand::thread_rng().gen_range(exp.saturating_sub(spread)..=exp.saturating_add(spread))
        } else {
            exp
        };
        Duration::from_millis(millis)
    }
}

/// Run `operation`, retrying retryable errors up to `config.max_attempts`.
///
/// `name` labels logs and the retry counter.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    name: &str,
    operation: F,
) -> ExchangeResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = name, attempts = attempt, "Read succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                warn!(
                    operation = name,
                    error = %e,
                    attempts = attempt,
                    "Read retries exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for(attempt - 1);
                warn!(
                    operation = name,
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying read"
                );
                Metrics::read_retry(name);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
