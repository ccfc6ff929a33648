//! Per-account market reads.
//!
//! [`MarketReader`] wraps an [`ExchangeApi`] with pacing and bounded retry.
//! Nothing is cached: every execution reads lot size, availability and
//! positions fresh.

use fanout_core::{Credentials, InstrumentInfo, InstrumentKind, MaxSize, Position};
use tracing::warn;

use crate::api::{DynExchange, MaxSizeQuery};
use crate::error::ExchangeResult;
use crate::rate_limiter::{DynRateLimit, Endpoint};
use crate::retry::{with_retry, RetryConfig};

/// Account key used to pace public endpoints.
const PUBLIC_ACCOUNT: &str = "public";

/// Market and account reader.
#[derive(Clone)]
pub struct MarketReader {
    api: DynExchange,
    limiter: DynRateLimit,
    retry: RetryConfig,
}

impl MarketReader {
    pub fn new(api: DynExchange, limiter: DynRateLimit, retry: RetryConfig) -> Self {
        Self {
            api,
            limiter,
            retry,
        }
    }

    /// Lot size of `inst_id`. Fails for unknown instruments.
    pub async fn get_lot_size(
        &self,
        kind: InstrumentKind,
        inst_id: &str,
    ) -> ExchangeResult<InstrumentInfo> {
        with_retry(&self.retry, "instrument", || async move {
            self.limiter
                .acquire(Endpoint::Instruments, PUBLIC_ACCOUNT)
                .await;
            self.api.instrument(kind, inst_id).await
        })
        .await
    }

    /// Maximum buy/sell size for one account.
    pub async fn get_max_size(
        &self,
        creds: &Credentials,
        query: &MaxSizeQuery,
    ) -> ExchangeResult<MaxSize> {
        let endpoint = if query.kind.is_derivative() {
            Endpoint::MaxSize
        } else {
            Endpoint::MaxAvailSize
        };
        with_retry(&self.retry, endpoint.as_str(), || async move {
            self.limiter.acquire(endpoint, creds.access_key()).await;
            self.api.max_size(creds, query).await
        })
        .await
    }

    /// The account's open position in `inst_id`, if any.
    ///
    /// A reported position with zero size is returned as-is; only a missing
    /// record is `None`. When several legs are reported, the first non-zero
    /// one wins and only that leg is closed; the others are logged and left
    /// open.
    pub async fn get_position(
        &self,
        creds: &Credentials,
        inst_id: &str,
    ) -> ExchangeResult<Option<Position>> {
        let positions = with_retry(&self.retry, "positions", || async move {
            self.limiter
                .acquire(Endpoint::Positions, creds.access_key())
                .await;
            self.api.positions(creds, inst_id).await
        })
        .await?;

        let (open, flat): (Vec<_>, Vec<_>) = positions
            .into_iter()
            .filter(|p| p.inst_id == inst_id)
            .partition(|p| !p.size.is_zero());

        let mut open = open.into_iter();
        let Some(chosen) = open.next() else {
            return Ok(flat.into_iter().next());
        };
        let skipped: Vec<&str> = open.map(|p| p.position_side.as_str()).collect();
        if !skipped.is_empty() {
            warn!(
                account = %creds.masked_id(),
                inst_id,
                closing = chosen.position_side.as_str(),
                ?skipped,
                "Several open legs, only one is closed"
            );
        }
        Ok(Some(chosen))
    }
}
