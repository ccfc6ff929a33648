//! Order building per account.
//!
//! Matches exhaustively on instrument family × open/close. Derivative orders
//! set leverage for (instrument, margin mode, position side) before anything
//! else, and a leverage failure aborts that account's order.

use tracing::{debug, warn};

use fanout_core::{
    ClientOrderId, Credentials, InstrumentKind, MarginMode, Order, OrderSide, OrderType,
    PositionSide, QuantitySpec, Size, TargetCurrency, TradeAction, TradeIntent, TradeMode,
};
use fanout_exchange::{
    DynExchange, DynRateLimit, Endpoint, LeverageRequest, MarketReader, MaxSizeQuery,
};
use fanout_telemetry::Metrics;

use crate::error::{ExecutorError, ExecutorResult};
use crate::sizing::{resolve_size, round_to_lot_size};

/// Builds one account's order, including the leverage side effect.
#[derive(Clone)]
pub struct OrderBuilder {
    reader: MarketReader,
    api: DynExchange,
    limiter: DynRateLimit,
    client_order_prefix: String,
    default_leverage: u32,
}

impl OrderBuilder {
    pub fn new(
        reader: MarketReader,
        api: DynExchange,
        limiter: DynRateLimit,
        client_order_prefix: impl Into<String>,
        default_leverage: u32,
    ) -> Self {
        Self {
            reader,
            api,
            limiter,
            client_order_prefix: client_order_prefix.into(),
            default_leverage,
        }
    }

    /// Prepare the order `creds` submits for `intent`.
    ///
    /// `inst_id` is the resolved instrument and `lot_size` its increment; both
    /// are read once per execution by the caller.
    pub async fn prepare(
        &self,
        intent: &TradeIntent,
        inst_id: &str,
        lot_size: Size,
        creds: &Credentials,
    ) -> ExecutorResult<Order> {
        let kind = intent.kind();
        match (kind, intent.action()) {
            (InstrumentKind::Spot, TradeAction::Open { side, quantity }) => {
                self.build_spot_open(inst_id, side, &quantity, lot_size, creds)
                    .await
            }
            (InstrumentKind::Spot, TradeAction::Close) => Err(ExecutorError::Validation(
                "spot instruments have no position to close".to_string(),
            )),
            (
                InstrumentKind::LinearPerp | InstrumentKind::InversePerp,
                TradeAction::Open { side, quantity },
            ) => {
                self.build_derivative_open(intent, inst_id, side, &quantity, lot_size, creds)
                    .await
            }
            (InstrumentKind::LinearPerp | InstrumentKind::InversePerp, TradeAction::Close) => {
                self.build_derivative_close(intent, inst_id, lot_size, creds)
                    .await
            }
        }
    }

    async fn build_spot_open(
        &self,
        inst_id: &str,
        side: OrderSide,
        quantity: &QuantitySpec,
        lot_size: Size,
        creds: &Credentials,
    ) -> ExecutorResult<Order> {
        let max = self
            .reader
            .get_max_size(creds, &MaxSizeQuery::spot(inst_id))
            .await
            .map_err(|e| ExecutorError::InstrumentLookup {
                inst_id: inst_id.to_string(),
                reason: e.to_string(),
            })?;
        let size = resolve_size(max.for_side(side), quantity, lot_size)?;

        Ok(Order {
            inst_id: inst_id.to_string(),
            td_mode: TradeMode::Cash,
            side,
            ord_type: OrderType::Market,
            size,
            pos_side: None,
            client_order_id: ClientOrderId::with_prefix(&self.client_order_prefix),
            tgt_ccy: Some(TargetCurrency::for_spot(side)),
            reduce_only: false,
        })
    }

    async fn build_derivative_open(
        &self,
        intent: &TradeIntent,
        inst_id: &str,
        side: OrderSide,
        quantity: &QuantitySpec,
        lot_size: Size,
        creds: &Credentials,
    ) -> ExecutorResult<Order> {
        let margin_mode = intent.margin_mode();
        let pos_side = PositionSide::for_open(side);
        let leverage = intent.leverage().unwrap_or(self.default_leverage);

        // Max size depends on leverage, so leverage goes first.
        self.set_leverage(creds, inst_id, leverage, margin_mode, pos_side)
            .await?;

        let query = MaxSizeQuery::derivative(inst_id, intent.kind(), margin_mode, pos_side);
        let max = self
            .reader
            .get_max_size(creds, &query)
            .await
            .map_err(|e| ExecutorError::InstrumentLookup {
                inst_id: inst_id.to_string(),
                reason: e.to_string(),
            })?;
        let size = resolve_size(max.for_side(side), quantity, lot_size)?;

        Ok(Order {
            inst_id: inst_id.to_string(),
            td_mode: margin_mode.into(),
            side,
            ord_type: OrderType::Market,
            size,
            pos_side: Some(pos_side),
            client_order_id: ClientOrderId::with_prefix(&self.client_order_prefix),
            tgt_ccy: None,
            reduce_only: false,
        })
    }

    async fn build_derivative_close(
        &self,
        intent: &TradeIntent,
        inst_id: &str,
        lot_size: Size,
        creds: &Credentials,
    ) -> ExecutorResult<Order> {
        let position = self
            .reader
            .get_position(creds, inst_id)
            .await
            .map_err(|e| ExecutorError::InstrumentLookup {
                inst_id: inst_id.to_string(),
                reason: format!("position read failed: {e}"),
            })?
            .ok_or_else(|| ExecutorError::PositionNotFound(inst_id.to_string()))?;

        if position.size.is_zero() {
            return Err(ExecutorError::Validation(format!(
                "position in {inst_id} has zero size, nothing to close"
            )));
        }

        let margin_mode = position.margin_mode.unwrap_or(intent.margin_mode());
        let leverage = intent.leverage().unwrap_or(self.default_leverage);
        self.set_leverage(creds, inst_id, leverage, margin_mode, position.position_side)
            .await?;

        let size = round_to_lot_size(position.size.abs(), lot_size);
        if !size.is_positive() {
            return Err(ExecutorError::Validation(format!(
                "position size {} in {inst_id} is below lot size {}",
                position.size.abs().to_wire(),
                lot_size.to_wire()
            )));
        }

        debug!(
            account = %creds.masked_id(),
            inst_id,
            position_side = %position.position_side,
            size = %size,
            "Closing position"
        );

        Ok(Order {
            inst_id: inst_id.to_string(),
            td_mode: margin_mode.into(),
            side: position.closing_side(),
            ord_type: OrderType::Market,
            size,
            pos_side: Some(position.position_side),
            client_order_id: ClientOrderId::with_prefix(&self.client_order_prefix),
            tgt_ccy: None,
            reduce_only: true,
        })
    }

    /// Set leverage; never retried.
    async fn set_leverage(
        &self,
        creds: &Credentials,
        inst_id: &str,
        leverage: u32,
        margin_mode: MarginMode,
        pos_side: PositionSide,
    ) -> ExecutorResult<()> {
        let request = LeverageRequest::new(inst_id, leverage, margin_mode, pos_side);
        self.limiter
            .acquire(Endpoint::SetLeverage, creds.access_key())
            .await;

        match self.api.set_leverage(creds, &request).await {
            Ok(()) => {
                Metrics::leverage_call(true);
                debug!(
                    account = %creds.masked_id(),
                    inst_id,
                    leverage,
                    margin_mode = %margin_mode,
                    "Leverage set"
                );
                Ok(())
            }
            Err(e) => {
                Metrics::leverage_call(false);
                warn!(
                    account = %creds.masked_id(),
                    inst_id,
                    leverage,
                    error = %e,
                    "Leverage rejected, order aborted"
                );
                Err(ExecutorError::Leverage {
                    inst_id: inst_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fanout_core::{MaxSize, Position};
    use fanout_exchange::{MockCall, MockExchange, NoopLimiter, RetryConfig};
    use rust_decimal_macros::dec;

    fn builder(mock: &Arc<MockExchange>) -> OrderBuilder {
        let limiter: DynRateLimit = Arc::new(NoopLimiter);
        let reader = MarketReader::new(mock.clone(), limiter.clone(), RetryConfig::no_retry());
        OrderBuilder::new(reader, mock.clone(), limiter, "tv", 10)
    }

    fn creds() -> Credentials {
        Credentials::new("acct-1", "secret", "pass").unwrap()
    }

    fn max(buy: rust_decimal::Decimal, sell: rust_decimal::Decimal) -> MaxSize {
        MaxSize {
            max_buy: Size::new(buy),
            max_sell: Size::new(sell),
        }
    }

    #[tokio::test]
    async fn test_spot_buy_uses_base_ccy_and_max_buy() {
        let mock = Arc::new(MockExchange::new());
        mock.set_max_size("acct-1", max(dec!(1.23456789), dec!(99)));
        let intent = TradeIntent::open(
            InstrumentKind::Spot,
            "BTC-USDT",
            OrderSide::Buy,
            QuantitySpec::Percentage(dec!(100)),
        );

        let order = builder(&mock)
            .prepare(&intent, "BTC-USDT", Size::new(dec!(0.0001)), &creds())
            .await
            .unwrap();
        assert_eq!(order.td_mode, TradeMode::Cash);
        assert_eq!(order.tgt_ccy, Some(TargetCurrency::BaseCcy));
        assert_eq!(order.size.to_wire(), "1.2345");
        assert_eq!(order.pos_side, None);
        assert!(order.client_order_id.as_str().starts_with("tv"));
        assert!(mock.leverage_calls().is_empty());
    }

    #[tokio::test]
    async fn test_spot_sell_uses_quote_ccy_and_max_sell() {
        let mock = Arc::new(MockExchange::new());
        mock.set_max_size("acct-1", max(dec!(99), dec!(10)));
        let intent = TradeIntent::open(
            InstrumentKind::Spot,
            "BTC-USDT",
            OrderSide::Sell,
            QuantitySpec::Percentage(dec!(50)),
        );

        let order = builder(&mock)
            .prepare(&intent, "BTC-USDT", Size::new(dec!(1)), &creds())
            .await
            .unwrap();
        assert_eq!(order.tgt_ccy, Some(TargetCurrency::QuoteCcy));
        assert_eq!(order.size.to_wire(), "5");
    }

    #[tokio::test]
    async fn test_perp_open_sets_leverage_before_sizing() {
        let mock = Arc::new(MockExchange::new());
        mock.set_max_size("acct-1", max(dec!(40), dec!(40)));
        let intent = TradeIntent::open(
            InstrumentKind::LinearPerp,
            "BTC-USDT",
            OrderSide::Sell,
            QuantitySpec::Percentage(dec!(25)),
        )
        .with_margin_mode(MarginMode::Isolated)
        .with_leverage(5);

        let order = builder(&mock)
            .prepare(&intent, "BTC-USDT-SWAP", Size::new(dec!(1)), &creds())
            .await
            .unwrap();
        assert_eq!(order.td_mode, TradeMode::Isolated);
        assert_eq!(order.pos_side, Some(PositionSide::Short));
        assert_eq!(order.size.to_wire(), "10");

        let calls = mock.calls();
        match &calls[0] {
            MockCall::SetLeverage { request, .. } => {
                assert_eq!(request.lever, "5");
                assert_eq!(request.mgn_mode, MarginMode::Isolated);
                assert_eq!(request.pos_side, Some(PositionSide::Short));
            }
            other => panic!("expected leverage call first, got {other:?}"),
        }
        match &calls[1] {
            MockCall::MaxSize { query, .. } => {
                assert_eq!(query.pos_side, Some(PositionSide::Short));
            }
            other => panic!("expected max size call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_leverage_failure_aborts_order() {
        let mock = Arc::new(MockExchange::new());
        mock.set_max_size("acct-1", max(dec!(40), dec!(40)));
        mock.fail_leverage_for("acct-1");
        let intent = TradeIntent::open(
            InstrumentKind::InversePerp,
            "BTC-USD",
            OrderSide::Buy,
            QuantitySpec::Percentage(dec!(100)),
        );

        let err = builder(&mock)
            .prepare(&intent, "BTC-USD-SWAP", Size::new(dec!(1)), &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Leverage { .. }));
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_close_uses_live_position() {
        let mock = Arc::new(MockExchange::new());
        mock.set_positions(
            "acct-1",
            vec![Position {
                inst_id: "BTC-USDT-SWAP".to_string(),
                size: Size::new(dec!(-2.5)),
                position_side: PositionSide::Short,
                margin_mode: Some(MarginMode::Isolated),
            }],
        );
        let intent = TradeIntent::close(InstrumentKind::LinearPerp, "BTC-USDT").unwrap();

        let order = builder(&mock)
            .prepare(&intent, "BTC-USDT-SWAP", Size::new(dec!(0.1)), &creds())
            .await
            .unwrap();
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.size.to_wire(), "2.5");
        assert_eq!(order.pos_side, Some(PositionSide::Short));
        assert_eq!(order.td_mode, TradeMode::Isolated);
        assert!(order.reduce_only);

        // Leverage is still set, with the default when the intent has none.
        let leverage = mock.leverage_calls();
        assert_eq!(leverage.len(), 1);
        assert_eq!(leverage[0].1.lever, "10");
        assert_eq!(leverage[0].1.pos_side, Some(PositionSide::Short));
        // Balance is never consulted for a close.
        assert!(!mock
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::MaxSize { .. })));
    }

    #[tokio::test]
    async fn test_close_without_position_fails() {
        let mock = Arc::new(MockExchange::new());
        let intent = TradeIntent::close(InstrumentKind::LinearPerp, "BTC-USDT").unwrap();
        let err = builder(&mock)
            .prepare(&intent, "BTC-USDT-SWAP", Size::new(dec!(0.1)), &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::PositionNotFound(_)));
        assert!(mock.leverage_calls().is_empty());
    }

    #[tokio::test]
    async fn test_close_zero_position_is_validation_error() {
        let mock = Arc::new(MockExchange::new());
        mock.set_positions(
            "acct-1",
            vec![Position {
                inst_id: "BTC-USDT-SWAP".to_string(),
                size: Size::ZERO,
                position_side: PositionSide::Net,
                margin_mode: None,
            }],
        );
        let intent = TradeIntent::close(InstrumentKind::LinearPerp, "BTC-USDT").unwrap();
        let err = builder(&mock)
            .prepare(&intent, "BTC-USDT-SWAP", Size::new(dec!(0.1)), &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sizing_failure_is_validation() {
        let mock = Arc::new(MockExchange::new());
        mock.set_max_size("acct-1", max(dec!(0.5), dec!(0.5)));
        let intent = TradeIntent::open(
            InstrumentKind::Spot,
            "BTC-USDT",
            OrderSide::Buy,
            QuantitySpec::Percentage(dec!(10)),
        );
        let err = builder(&mock)
            .prepare(&intent, "BTC-USDT", Size::new(dec!(1)), &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_max_size_is_lookup_error() {
        let mock = Arc::new(MockExchange::new());
        let intent = TradeIntent::open(
            InstrumentKind::Spot,
            "BTC-USDT",
            OrderSide::Buy,
            QuantitySpec::Percentage(dec!(10)),
        );
        let err = builder(&mock)
            .prepare(&intent, "BTC-USDT", Size::new(dec!(1)), &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InstrumentLookup { .. }));
    }
}
