//! Trade intents.
//!
//! A [`TradeIntent`] is the immutable, typed form of one webhook signal. It is a
//! closed variant over instrument family × open/close, so downstream code
//! matches exhaustively instead of probing loosely-typed payload fields.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::market::InstrumentKind;
use crate::order::{MarginMode, OrderSide};
use crate::Size;

/// Highest leverage the exchange accepts on any perpetual.
pub const MAX_LEVERAGE: u32 = 125;

/// Leverage applied to derivatives when the signal does not carry one.
pub const DEFAULT_LEVERAGE: u32 = 10;

/// Requested quantity: a share of the available maximum, or an absolute size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum QuantitySpec {
    /// Percentage in `(0, 100]`.
    Percentage(Decimal),
    /// Absolute size in instrument units.
    Absolute(Size),
}

impl QuantitySpec {
    /// Whether this requests the whole available maximum.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Percentage(p) if *p == Decimal::ONE_HUNDRED)
    }
}

impl FromStr for QuantitySpec {
    type Err = CoreError;

    /// Parse `"50%"` as a percentage and `"0.25"` as an absolute size.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let pct: Decimal = pct
                .trim()
                .parse()
                .map_err(|_| CoreError::Validation(format!("invalid percentage format: {s:?}")))?;
            if pct <= Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                return Err(CoreError::Validation(format!(
                    "percentage must be between 0 and 100, got {pct}"
                )));
            }
            Ok(Self::Percentage(pct))
        } else {
            let amount: Size = s
                .parse()
                .map_err(|_| CoreError::Validation(format!("invalid quantity format: {s:?}")))?;
            if !amount.is_positive() {
                return Err(CoreError::Validation(format!(
                    "quantity must be greater than 0, got {amount}"
                )));
            }
            Ok(Self::Absolute(amount))
        }
    }
}

impl fmt::Display for QuantitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percentage(p) => write!(f, "{p}%"),
            Self::Absolute(s) => write!(f, "{s}"),
        }
    }
}

/// Open a new position or close the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "action")]
pub enum TradeAction {
    Open { side: OrderSide, quantity: QuantitySpec },
    /// Size and side come from the live position.
    Close,
}

/// Immutable trade instruction executed across all accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    symbol: String,
    kind: InstrumentKind,
    action: TradeAction,
    margin_mode: MarginMode,
    leverage: Option<u32>,
}

impl TradeIntent {
    /// Intent opening (or adding to) a position.
    pub fn open(
        kind: InstrumentKind,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: QuantitySpec,
    ) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            kind,
            action: TradeAction::Open { side, quantity },
            margin_mode: MarginMode::default(),
            leverage: None,
        }
    }

    /// Intent closing the whole live position. Spot has nothing to close.
    pub fn close(kind: InstrumentKind, symbol: impl Into<String>) -> Result<Self> {
        if !kind.is_derivative() {
            return Err(CoreError::Validation(
                "closePosition is only supported for perpetual swaps".to_string(),
            ));
        }
        Ok(Self {
            symbol: symbol.into().trim().to_uppercase(),
            kind,
            action: TradeAction::Close,
            margin_mode: MarginMode::default(),
            leverage: None,
        })
    }

    #[must_use]
    pub fn with_margin_mode(mut self, mode: MarginMode) -> Self {
        self.margin_mode = mode;
        self
    }

    /// Set leverage. Validated by [`TradeIntent::validate`].
    #[must_use]
    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub fn action(&self) -> TradeAction {
        self.action
    }

    pub fn margin_mode(&self) -> MarginMode {
        self.margin_mode
    }

    pub fn leverage(&self) -> Option<u32> {
        self.leverage
    }

    pub fn is_close(&self) -> bool {
        matches!(self.action, TradeAction::Close)
    }

    /// Check leverage bounds and instrument resolution.
    pub fn validate(&self) -> Result<()> {
        if let Some(lever) = self.leverage {
            if lever == 0 || lever > MAX_LEVERAGE {
                return Err(CoreError::Validation(format!(
                    "leverage must be between 1 and {MAX_LEVERAGE}, got {lever}"
                )));
            }
        }
        self.instrument_id().map(|_| ())
    }

    /// Resolve the concrete exchange instrument identifier.
    ///
    /// - spot: `BASE-QUOTE`, must not be a swap
    /// - linear perp: `BASE-QUOTE-SWAP` with a stablecoin quote
    /// - inverse perp: `BASE-USD-SWAP`
    ///
    /// `-SWAP` is appended for perpetuals when the symbol omits it.
    pub fn instrument_id(&self) -> Result<String> {
        let symbol = self.symbol.as_str();
        let pair = symbol.strip_suffix("-SWAP").unwrap_or(symbol);
        let (base, quote) = pair.split_once('-').ok_or_else(|| {
            CoreError::Validation(format!("symbol must look like BASE-QUOTE: {symbol:?}"))
        })?;
        if base.is_empty() || quote.is_empty() || quote.contains('-') {
            return Err(CoreError::Validation(format!(
                "symbol must look like BASE-QUOTE: {symbol:?}"
            )));
        }

        match self.kind {
            InstrumentKind::Spot => {
                if symbol.ends_with("-SWAP") {
                    return Err(CoreError::Validation(format!(
                        "spot intent cannot trade swap instrument {symbol}"
                    )));
                }
                Ok(pair.to_string())
            }
            InstrumentKind::LinearPerp => {
                if quote == "USD" {
                    return Err(CoreError::Validation(format!(
                        "{symbol} is coin-margined; use the inverse perpetual type"
                    )));
                }
                Ok(format!("{pair}-SWAP"))
            }
            InstrumentKind::InversePerp => {
                if quote != "USD" {
                    return Err(CoreError::Validation(format!(
                        "{symbol} is not coin-margined; inverse perpetuals settle against USD"
                    )));
                }
                Ok(format!("{pair}-SWAP"))
            }
        }
    }
}

impl fmt::Display for TradeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            TradeAction::Open { side, quantity } => {
                write!(f, "{} {} {} {}", self.kind, side, quantity, self.symbol)
            }
            TradeAction::Close => write!(f, "{} close {}", self.kind, self.symbol),
        }
    }
}

/// Webhook signal payload as posted by the signal source.
///
/// Authentication and schema checks happen before this point; conversion into
/// a [`TradeIntent`] only enforces the semantic rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub exchange: Option<String>,
    pub symbol: String,
    #[serde(rename = "type")]
    pub trade_type: String,
    #[serde(default)]
    pub side: Option<OrderSide>,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub margin_mode: Option<String>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub close_position: bool,
}

impl TryFrom<WebhookPayload> for TradeIntent {
    type Error = CoreError;

    fn try_from(payload: WebhookPayload) -> Result<Self> {
        if let Some(exchange) = payload.exchange.as_deref() {
            if !exchange.eq_ignore_ascii_case("okx") {
                return Err(CoreError::Validation(format!(
                    "unsupported exchange: {exchange}"
                )));
            }
        }

        let kind = match payload.trade_type.trim().to_ascii_lowercase().as_str() {
            "spot" => InstrumentKind::Spot,
            "perps" | "linear-perp" => InstrumentKind::LinearPerp,
            "invperps" | "inverse-perp" => InstrumentKind::InversePerp,
            other => {
                return Err(CoreError::Validation(format!("unknown trade type: {other:?}")))
            }
        };

        let intent = if payload.close_position {
            TradeIntent::close(kind, payload.symbol)?
        } else {
            let side = payload
                .side
                .ok_or_else(|| CoreError::Validation("side is required".to_string()))?;
            let quantity: QuantitySpec = payload
                .qty
                .as_deref()
                .ok_or_else(|| CoreError::Validation("qty is required".to_string()))?
                .parse()?;
            TradeIntent::open(kind, payload.symbol, side, quantity)
        };

        // Spot always trades in cash mode, margin fields are ignored.
        let intent = if kind.is_derivative() {
            let mode = match payload.margin_mode.as_deref().map(str::trim) {
                None | Some("") | Some("cross") => MarginMode::Cross,
                Some("isolated") => MarginMode::Isolated,
                Some(other) => {
                    return Err(CoreError::Validation(format!(
                        "margin mode must be cross or isolated, got {other:?}"
                    )))
                }
            };
            intent
                .with_margin_mode(mode)
                .with_leverage(payload.leverage.unwrap_or(DEFAULT_LEVERAGE))
        } else {
            intent
        };

        intent.validate()?;
        Ok(intent)
    }
}
