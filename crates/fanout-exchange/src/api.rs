//! Exchange access trait.
//!
//! Abstracts the five REST calls the fan-out engine makes so the dispatcher
//! can be exercised against [`MockExchange`] and run against
//! [`crate::OkxRestClient`] in production.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use fanout_core::{
    Credentials, InstrumentInfo, InstrumentKind, MarginMode, MaxSize, Order, Position,
    PositionSide, Size, TradeMode,
};

use crate::error::{ExchangeError, ExchangeResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

// =============================================================================
// Requests and acknowledgements
// =============================================================================

/// Max-size query for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxSizeQuery {
    pub inst_id: String,
    pub kind: InstrumentKind,
    pub td_mode: TradeMode,
    /// Only sent for isolated margin.
    pub pos_side: Option<PositionSide>,
}

impl MaxSizeQuery {
    /// Spot query: balance-derived availability in cash mode.
    pub fn spot(inst_id: impl Into<String>) -> Self {
        Self {
            inst_id: inst_id.into(),
            kind: InstrumentKind::Spot,
            td_mode: TradeMode::Cash,
            pos_side: None,
        }
    }

    /// Derivative query. The position side is dropped unless margin is isolated.
    pub fn derivative(
        inst_id: impl Into<String>,
        kind: InstrumentKind,
        margin_mode: MarginMode,
        pos_side: PositionSide,
    ) -> Self {
        Self {
            inst_id: inst_id.into(),
            kind,
            td_mode: margin_mode.into(),
            pos_side: (margin_mode == MarginMode::Isolated).then_some(pos_side),
        }
    }
}

/// Body of the leverage-set call. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageRequest {
    pub inst_id: String,
    pub lever: String,
    pub mgn_mode: MarginMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<PositionSide>,
}

impl LeverageRequest {
    /// `net` is not a leverage key; it is omitted from the request.
    pub fn new(
        inst_id: impl Into<String>,
        lever: u32,
        mgn_mode: MarginMode,
        pos_side: PositionSide,
    ) -> Self {
        Self {
            inst_id: inst_id.into(),
            lever: lever.to_string(),
            mgn_mode,
            pos_side: (pos_side != PositionSide::Net).then_some(pos_side),
        }
    }
}

/// Per-order acknowledgement inside a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: String,
    /// `"0"` on success.
    pub code: String,
    pub message: String,
}

impl OrderAck {
    pub fn is_success(&self) -> bool {
        self.code == "0"
    }
}

// =============================================================================
// Trait
// =============================================================================

/// REST surface used by the fan-out engine.
///
/// Private calls take the credentials of the one account they act for.
/// Implementations never retry leverage or order calls.
pub trait ExchangeApi: Send + Sync {
    /// Public instrument lookup. Unknown instruments are
    /// [`ExchangeError::UnknownInstrument`].
    fn instrument<'a>(
        &'a self,
        kind: InstrumentKind,
        inst_id: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<InstrumentInfo>>;

    /// Maximum order size for one account. A missing bound is an error.
    fn max_size<'a>(
        &'a self,
        creds: &'a Credentials,
        query: &'a MaxSizeQuery,
    ) -> BoxFuture<'a, ExchangeResult<MaxSize>>;

    /// Open positions of one account for `inst_id`.
    fn positions<'a>(
        &'a self,
        creds: &'a Credentials,
        inst_id: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<Position>>>;

    fn set_leverage<'a>(
        &'a self,
        creds: &'a Credentials,
        request: &'a LeverageRequest,
    ) -> BoxFuture<'a, ExchangeResult<()>>;

    /// Submit up to 20 orders for one account in one signed call.
    ///
    /// `Ok` means the call was accepted; each ack carries its own code.
    fn place_batch<'a>(
        &'a self,
        creds: &'a Credentials,
        orders: &'a [Order],
    ) -> BoxFuture<'a, ExchangeResult<Vec<OrderAck>>>;
}

/// Arc wrapper for ExchangeApi trait objects.
pub type DynExchange = Arc<dyn ExchangeApi>;

// =============================================================================
// Mock
// =============================================================================

/// Call recorded by [`MockExchange`]. Accounts are access keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Instrument { inst_id: String },
    MaxSize { account: String, query: MaxSizeQuery },
    Positions { account: String, inst_id: String },
    SetLeverage { account: String, request: LeverageRequest },
    PlaceBatch { account: String, orders: Vec<Order> },
}

#[derive(Debug, Default)]
struct MockState {
    lot_sizes: HashMap<String, Size>,
    max_sizes: HashMap<String, MaxSize>,
    default_max_size: Option<MaxSize>,
    positions: HashMap<String, Vec<Position>>,
    leverage_failures: HashSet<String>,
    batch_failures: HashSet<String>,
    order_rejections: HashSet<String>,
}

/// Scripted exchange for testing.
///
/// Scripts are keyed by access key; unscripted reads fail like the real
/// exchange would (unknown instrument, missing bound).
#[derive(Debug, Default)]
pub struct MockExchange {
    state: Mutex<MockState>,
    calls: Mutex<Vec<MockCall>>,
    /// Remaining transient failures injected into `max_size`.
    transient_read_failures: AtomicU32,
    order_seq: AtomicU32,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lot_size(&self, inst_id: &str, lot: Size) {
        self.state.lock().lot_sizes.insert(inst_id.to_string(), lot);
    }

    pub fn set_max_size(&self, access_key: &str, max: MaxSize) {
        self.state
            .lock()
            .max_sizes
            .insert(access_key.to_string(), max);
    }

    /// Max size returned for accounts without their own script.
    pub fn set_default_max_size(&self, max: MaxSize) {
        self.state.lock().default_max_size = Some(max);
    }

    pub fn set_positions(&self, access_key: &str, positions: Vec<Position>) {
        self.state
            .lock()
            .positions
            .insert(access_key.to_string(), positions);
    }

    pub fn fail_leverage_for(&self, access_key: &str) {
        self.state
            .lock()
            .leverage_failures
            .insert(access_key.to_string());
    }

    pub fn fail_batch_for(&self, access_key: &str) {
        self.state
            .lock()
            .batch_failures
            .insert(access_key.to_string());
    }

    /// Accept the batch call but reject every order in it.
    pub fn reject_orders_for(&self, access_key: &str) {
        self.state
            .lock()
            .order_rejections
            .insert(access_key.to_string());
    }

    /// Fail the next `count` max-size reads with a retryable error.
    pub fn fail_next_reads(&self, count: u32) {
        self.transient_read_failures.store(count, Ordering::SeqCst);
    }

    /// Get recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Recorded batch submissions as `(account, orders)`.
    pub fn batches(&self) -> Vec<(String, Vec<Order>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::PlaceBatch { account, orders } => Some((account.clone(), orders.clone())),
                _ => None,
            })
            .collect()
    }

    /// Recorded leverage calls as `(account, request)`.
    pub fn leverage_calls(&self) -> Vec<(String, LeverageRequest)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::SetLeverage { account, request } => {
                    Some((account.clone(), request.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }
}

impl ExchangeApi for MockExchange {
    fn instrument<'a>(
        &'a self,
        _kind: InstrumentKind,
        inst_id: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<InstrumentInfo>> {
        Box::pin(async move {
            self.record(MockCall::Instrument {
                inst_id: inst_id.to_string(),
            });
            let lot = self.state.lock().lot_sizes.get(inst_id).copied();
            lot.map(|lot_size| InstrumentInfo {
                inst_id: inst_id.to_string(),
                lot_size,
            })
            .ok_or_else(|| ExchangeError::UnknownInstrument(inst_id.to_string()))
        })
    }

    fn max_size<'a>(
        &'a self,
        creds: &'a Credentials,
        query: &'a MaxSizeQuery,
    ) -> BoxFuture<'a, ExchangeResult<MaxSize>> {
        Box::pin(async move {
            self.record(MockCall::MaxSize {
                account: creds.access_key().to_string(),
                query: query.clone(),
            });
            let remaining = self.transient_read_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_read_failures
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(ExchangeError::HttpStatus {
                    status: 503,
                    body: "service unavailable".to_string(),
                });
            }
            let state = self.state.lock();
            state
                .max_sizes
                .get(creds.access_key())
                .copied()
                .or(state.default_max_size)
                .ok_or_else(|| {
                    ExchangeError::MalformedResponse(format!(
                        "max size for {} missing bounds",
                        query.inst_id
                    ))
                })
        })
    }

    fn positions<'a>(
        &'a self,
        creds: &'a Credentials,
        inst_id: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<Position>>> {
        Box::pin(async move {
            self.record(MockCall::Positions {
                account: creds.access_key().to_string(),
                inst_id: inst_id.to_string(),
            });
            let state = self.state.lock();
            Ok(state
                .positions
                .get(creds.access_key())
                .map(|positions| {
                    positions
                        .iter()
                        .filter(|p| p.inst_id == inst_id)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn set_leverage<'a>(
        &'a self,
        creds: &'a Credentials,
        request: &'a LeverageRequest,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move {
            self.record(MockCall::SetLeverage {
                account: creds.access_key().to_string(),
                request: request.clone(),
            });
            if self
                .state
                .lock()
                .leverage_failures
                .contains(creds.access_key())
            {
                return Err(ExchangeError::Api {
                    code: "59000".to_string(),
                    msg: "leverage setting rejected".to_string(),
                });
            }
            Ok(())
        })
    }

    fn place_batch<'a>(
        &'a self,
        creds: &'a Credentials,
        orders: &'a [Order],
    ) -> BoxFuture<'a, ExchangeResult<Vec<OrderAck>>> {
        Box::pin(async move {
            self.record(MockCall::PlaceBatch {
                account: creds.access_key().to_string(),
                orders: orders.to_vec(),
            });
            let (fail, reject) = {
                let state = self.state.lock();
                (
                    state.batch_failures.contains(creds.access_key()),
                    state.order_rejections.contains(creds.access_key()),
                )
            };
            if fail {
                return Err(ExchangeError::Api {
                    code: "50001".to_string(),
                    msg: "service temporarily unavailable".to_string(),
                });
            }
            Ok(orders
                .iter()
                .map(|order| {
                    let seq = self.order_seq.fetch_add(1, Ordering::SeqCst);
                    if reject {
                        OrderAck {
                            order_id: String::new(),
                            client_order_id: order.client_order_id.to_string(),
                            code: "51008".to_string(),
                            message: "insufficient balance".to_string(),
                        }
                    } else {
                        OrderAck {
                            order_id: format!("mock-{seq}"),
                            client_order_id: order.client_order_id.to_string(),
                            code: "0".to_string(),
                            message: String::new(),
                        }
                    }
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn creds(key: &str) -> Credentials {
        Credentials::new(key, "secret", "pass").unwrap()
    }

    #[test]
    fn test_leverage_body_field_order() {
        let req = LeverageRequest::new(
            "BTC-USDT-SWAP",
            5,
            MarginMode::Isolated,
            PositionSide::Long,
        );
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"instId":"BTC-USDT-SWAP","lever":"5","mgnMode":"isolated","posSide":"long"}"#
        );
    }

    #[test]
    fn test_leverage_net_side_omitted() {
        let req = LeverageRequest::new("BTC-USD-SWAP", 10, MarginMode::Cross, PositionSide::Net);
        assert_eq!(req.pos_side, None);
    }

    #[test]
    fn test_max_size_query_pos_side_only_isolated() {
        let cross = MaxSizeQuery::derivative(
            "BTC-USDT-SWAP",
            InstrumentKind::LinearPerp,
            MarginMode::Cross,
            PositionSide::Long,
        );
        assert_eq!(cross.pos_side, None);
        assert_eq!(cross.td_mode, TradeMode::Cross);

        let isolated = MaxSizeQuery::derivative(
            "BTC-USDT-SWAP",
            InstrumentKind::LinearPerp,
            MarginMode::Isolated,
            PositionSide::Short,
        );
        assert_eq!(isolated.pos_side, Some(PositionSide::Short));

        let spot = MaxSizeQuery::spot("BTC-USDT");
        assert_eq!(spot.td_mode, TradeMode::Cash);
    }

    #[tokio::test]
    async fn test_mock_scripts_per_account() {
        let mock = MockExchange::new();
        mock.set_lot_size("BTC-USDT", Size::new(dec!(0.0001)));
        mock.set_max_size(
            "a1",
            MaxSize {
                max_buy: Size::new(dec!(1)),
                max_sell: Size::new(dec!(2)),
            },
        );

        let info = mock.instrument(InstrumentKind::Spot, "BTC-USDT").await.unwrap();
        assert_eq!(info.lot_size.inner(), dec!(0.0001));
        assert!(matches!(
            mock.instrument(InstrumentKind::Spot, "ETH-USDT").await,
            Err(ExchangeError::UnknownInstrument(_))
        ));

        let query = MaxSizeQuery::spot("BTC-USDT");
        assert!(mock.max_size(&creds("a1"), &query).await.is_ok());
        assert!(mock.max_size(&creds("a2"), &query).await.is_err());
        assert_eq!(mock.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_mock_transient_failures() {
        let mock = MockExchange::new();
        mock.set_default_max_size(MaxSize {
            max_buy: Size::ONE,
            max_sell: Size::ONE,
        });
        mock.fail_next_reads(1);
        let query = MaxSizeQuery::spot("BTC-USDT");
        let err = mock.max_size(&creds("a1"), &query).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(mock.max_size(&creds("a1"), &query).await.is_ok());
    }
}
