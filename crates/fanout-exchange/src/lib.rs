//! OKX v5 REST access for the fan-out engine.
//!
//! # Key Components
//!
//! - [`signer`]: HMAC-SHA256 request signing and `ACCESS-*` headers
//! - [`ExchangeApi`]: Dyn-compatible seam over the five REST calls, with
//!   [`MockExchange`] for tests
//! - [`OkxRestClient`]: Signed reqwest implementation
//! - [`MarketReader`]: Lot size, max size and position reads with retry
//! - [`TokenBucketLimiter`]: Per-endpoint, per-account pacing

pub mod api;
pub mod client;
pub mod error;
pub mod market;
pub mod rate_limiter;
pub mod retry;
pub mod signer;

pub use api::{
    BoxFuture, DynExchange, ExchangeApi, LeverageRequest, MaxSizeQuery, MockCall, MockExchange,
    OrderAck,
};
pub use client::{OkxClientConfig, OkxRestClient, DEFAULT_BASE_URL};
pub use error::{ExchangeError, ExchangeResult};
pub use market::MarketReader;
pub use rate_limiter::{
    DynRateLimit, Endpoint, NoopLimiter, RateLimit, RateRule, TokenBucketLimiter,
};
pub use retry::{with_retry, RetryConfig};
pub use signer::{sign, AuthHeaders};
