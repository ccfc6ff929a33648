//! Execution-related types.
//!
//! This module provides types for:
//! - The wire order submitted in a batch call
//! - Per-account execution results
//! - The aggregated execution report handed to notification

use serde::{Deserialize, Serialize, Serializer};

use crate::order::{ClientOrderId, OrderSide, PositionSide, TradeMode};
use crate::Size;

// ============================================================================
// Wire Order
// ============================================================================

/// Order type. Signals execute at market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
}

/// Unit a spot market order's size is denominated in (`tgtCcy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCurrency {
    BaseCcy,
    QuoteCcy,
}

impl TargetCurrency {
    /// Spot buys are sized in the base asset, spot sells in the quote asset.
    ///
    /// This mirrors how the exchange accounts spot market orders for these
    /// signals and must not be "normalized".
    pub fn for_spot(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Self::BaseCcy,
            OrderSide::Sell => Self::QuoteCcy,
        }
    }
}

fn serialize_wire_size<S: Serializer>(size: &Size, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&size.to_wire())
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One order inside a batch submission.
///
/// `size` is already a positive multiple of the lot size; nothing downstream
/// rounds it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub inst_id: String,
    pub td_mode: TradeMode,
    pub side: OrderSide,
    pub ord_type: OrderType,
    #[serde(rename = "sz", serialize_with = "serialize_wire_size")]
    pub size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<PositionSide>,
    #[serde(rename = "clOrdId")]
    pub client_order_id: ClientOrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tgt_ccy: Option<TargetCurrency>,
    /// Set on orders that flatten an existing position.
    #[serde(skip_serializing_if = "is_false")]
    pub reduce_only: bool,
}

// ============================================================================
// Execution Results
// ============================================================================

/// Stage at which an account's contribution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Lookup, sizing or leverage before submission.
    Prepare,
    /// The signed batch call itself failed.
    Submit,
    /// The exchange rejected this order inside an accepted batch.
    Exchange,
    /// No outcome was recorded for the account.
    Missing,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Submit => "submit",
            Self::Exchange => "exchange",
            Self::Missing => "missing",
        }
    }
}

/// Outcome for one account within one execution. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Masked account identifier.
    pub account: String,
    pub inst_id: String,
    pub success: bool,
    /// Filled-at-submission size for successes, zero otherwise.
    pub volume: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<FailureStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Successful submission of `order`.
    pub fn accepted(account: String, order: &Order, order_id: Option<String>) -> Self {
        Self {
            account,
            inst_id: order.inst_id.clone(),
            success: true,
            volume: order.size,
            client_order_id: Some(order.client_order_id.to_string()),
            order_id,
            stage: None,
            error: None,
        }
    }

    /// Failed contribution.
    pub fn failed(
        account: String,
        inst_id: impl Into<String>,
        stage: FailureStage,
        error: impl Into<String>,
    ) -> Self {
        Self {
            account,
            inst_id: inst_id.into(),
            success: false,
            volume: Size::ZERO,
            client_order_id: None,
            order_id: None,
            stage: Some(stage),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_client_order_id(mut self, id: &ClientOrderId) -> Self {
        self.client_order_id = Some(id.to_string());
        self
    }
}

/// Masked failure entry for notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub account: String,
    pub inst_id: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Aggregated outcome of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub results: Vec<ExecutionResult>,
    pub successful: usize,
    pub failed: usize,
    pub total_volume: Size,
    pub failures: Vec<FailureEntry>,
}

impl ExecutionReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.successful > 0
    }

    /// One-line human summary.
    pub fn summary_line(&self) -> String {
        format!(
            "{} succeeded, {} failed, total volume {}",
            self.successful,
            self.failed,
            self.total_volume.to_wire()
        )
    }
}
