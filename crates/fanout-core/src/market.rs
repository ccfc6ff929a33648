//! Instrument families and per-account market state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::{MarginMode, PositionSide};
use crate::Size;

/// Instrument family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentKind {
    /// Spot pair (e.g. BTC-USDT).
    Spot,
    /// Stablecoin-margined perpetual swap (e.g. BTC-USDT-SWAP).
    LinearPerp,
    /// Coin-margined perpetual swap (e.g. BTC-USD-SWAP).
    InversePerp,
}

impl InstrumentKind {
    /// `instType` query value.
    pub fn inst_type(&self) -> &'static str {
        match self {
            Self::Spot => "SPOT",
            Self::LinearPerp | Self::InversePerp => "SWAP",
        }
    }

    pub fn is_derivative(&self) -> bool {
        !matches!(self, Self::Spot)
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::LinearPerp => write!(f, "linear-perp"),
            Self::InversePerp => write!(f, "inverse-perp"),
        }
    }
}

/// Static instrument data. Fetched per execution, never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub inst_id: String,
    pub lot_size: Size,
}

/// Maximum order size available to one account for one instrument and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxSize {
    pub max_buy: Size,
    pub max_sell: Size,
}

impl MaxSize {
    pub fn for_side(&self, side: crate::OrderSide) -> Size {
        match side {
            crate::OrderSide::Buy => self.max_buy,
            crate::OrderSide::Sell => self.max_sell,
        }
    }
}

/// Open position as reported by the exchange.
///
/// `size` is signed: negative means short in net mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub inst_id: String,
    pub size: Size,
    pub position_side: PositionSide,
    pub margin_mode: Option<MarginMode>,
}

impl Position {
    /// Side of the order that flattens this position.
    ///
    /// Long/short legs are explicit; a net position closes against its sign.
    pub fn closing_side(&self) -> crate::OrderSide {
        match self.position_side {
            PositionSide::Long => crate::OrderSide::Sell,
            PositionSide::Short => crate::OrderSide::Buy,
            PositionSide::Net => {
                if self.size.inner().is_sign_negative() {
                    crate::OrderSide::Buy
                } else {
                    crate::OrderSide::Sell
                }
            }
        }
    }
}
