//! Order-related enums and identifiers.
//!
//! Provides order side, position side, trade mode and client order ID types
//! using the exchange's lowercase wire spellings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Maximum client order ID length accepted by the exchange.
pub const CLIENT_ORDER_ID_MAX_LEN: usize = 32;

/// Random hex characters every generated client order ID carries.
pub const CLIENT_ORDER_ID_MIN_RANDOM: usize = 16;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position side for derivatives.
///
/// `Net` is reported by accounts in one-way mode; `Long`/`Short` by accounts
/// in long/short (hedge) mode or when isolated margin tracks each leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
    Net,
}

impl PositionSide {
    /// Position side an opening order on `side` creates.
    pub fn for_open(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Self::Long,
            OrderSide::Sell => Self::Short,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Net => "net",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Margin mode for derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Cross,
    Isolated,
}

impl MarginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cross => "cross",
            Self::Isolated => "isolated",
        }
    }
}

impl fmt::Display for MarginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade mode sent as `tdMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Cash,
    Cross,
    Isolated,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Cross => "cross",
            Self::Isolated => "isolated",
        }
    }
}

impl From<MarginMode> for TradeMode {
    fn from(mode: MarginMode) -> Self {
        match mode {
            MarginMode::Cross => Self::Cross,
            MarginMode::Isolated => Self::Isolated,
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client order ID for tracking and idempotency.
///
/// Always alphanumeric and at most 32 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID starting with `prefix`.
    ///
    /// Format: `{prefix}{timestamp_ms tail}{uuid_hex}`, 32 characters. At
    /// least [`CLIENT_ORDER_ID_MIN_RANDOM`] random hex characters always
    /// remain; the timestamp gives up its leading digits first. The prefix
    /// must already be validated with [`validate_order_prefix`].
    pub fn with_prefix(prefix: &str) -> Self {
        let ts = chrono::Utc::now().timestamp_millis().to_string();
        let uuid_hex = Uuid::new_v4().simple().to_string();

        let room = CLIENT_ORDER_ID_MAX_LEN.saturating_sub(prefix.len());
        let ts_len = room.saturating_sub(CLIENT_ORDER_ID_MIN_RANDOM).min(ts.len());
        let random_len = (room - ts_len).min(uuid_hex.len());

        Self(format!(
            "{prefix}{}{}",
            &ts[ts.len() - ts_len..],
            &uuid_hex[..random_len]
        ))
    }

    /// Create from an existing string (for parsing responses).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check a client order ID prefix: 1-16 ASCII alphanumeric characters.
///
/// Sixteen characters leave room for the timestamp so IDs stay unique.
pub fn validate_order_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || prefix.len() > 16 {
        return Err(CoreError::Validation(format!(
            "client order prefix must be 1-16 characters, got {}",
            prefix.len()
        )));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Validation(format!(
            "client order prefix must be alphanumeric: {prefix:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_position_side_for_open() {
        assert_eq!(PositionSide::for_open(OrderSide::Buy), PositionSide::Long);
        assert_eq!(PositionSide::for_open(OrderSide::Sell), PositionSide::Short);
    }

    #[test]
    fn test_trade_mode_from_margin() {
        assert_eq!(TradeMode::from(MarginMode::Cross), TradeMode::Cross);
        assert_eq!(TradeMode::from(MarginMode::Isolated).as_str(), "isolated");
    }

    #[test]
    fn test_client_order_id_unique() {
        let id1 = ClientOrderId::with_prefix("tv");
        let id2 = ClientOrderId::with_prefix("tv");
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_client_order_id_format() {
        let id = ClientOrderId::with_prefix("fanout");
        assert!(id.as_str().starts_with("fanout"));
        assert!(id.as_str().len() <= CLIENT_ORDER_ID_MAX_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));

        let long = ClientOrderId::with_prefix("abcdefghijklmnop");
        assert_eq!(long.as_str().len(), CLIENT_ORDER_ID_MAX_LEN);
        assert!(long.as_str().starts_with("abcdefghijklmnop"));
    }

    #[test]
    fn test_client_order_id_unique_at_longest_prefix() {
        let prefix = "abcdefghijklmnop";
        let ids: std::collections::HashSet<_> = (0..5000)
            .map(|_| ClientOrderId::with_prefix(prefix))
            .collect();
        assert_eq!(ids.len(), 5000);

        let id = ids.iter().next().unwrap();
        let suffix = &id.as_str()[prefix.len()..];
        assert!(suffix.len() >= CLIENT_ORDER_ID_MIN_RANDOM);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_client_order_id_keeps_timestamp_for_short_prefix() {
        let id = ClientOrderId::with_prefix("tv");
        assert_eq!(id.as_str().len(), CLIENT_ORDER_ID_MAX_LEN);
        // "tv" + 13-digit millis + 17 hex
        assert!(id.as_str()[2..15].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_prefix_validation() {
        assert!(validate_order_prefix("tv01").is_ok());
        assert!(validate_order_prefix("").is_err());
        assert!(validate_order_prefix("has_underscore").is_err());
        assert!(validate_order_prefix("abcdefghijklmnopq").is_err());
    }

    #[test]
    fn test_wire_spellings() {
        assert_eq!(serde_json::to_string(&PositionSide::Short).unwrap(), "\"short\"");
        assert_eq!(serde_json::to_string(&TradeMode::Cash).unwrap(), "\"cash\"");
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"buy\"");
    }
}
