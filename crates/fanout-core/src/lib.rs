//! Core domain types for the multi-account order fan-out engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Size`: Precision-safe decimal size with lot rounding
//! - `Credentials`: Validated, redacting API credential triple
//! - `TradeIntent`: Closed variant over instrument family × open/close
//! - `Order`, `ExecutionResult`, `ExecutionReport`: Wire order and outcomes

pub mod credentials;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod intent;
pub mod market;
pub mod order;

pub use credentials::{mask_identifier, Credentials, RawCredentials};
pub use decimal::Size;
pub use error::{CoreError, Result};
pub use intent::{
    QuantitySpec, TradeAction, TradeIntent, WebhookPayload, DEFAULT_LEVERAGE, MAX_LEVERAGE,
};
pub use market::{InstrumentInfo, InstrumentKind, MaxSize, Position};
pub use order::{
    validate_order_prefix, ClientOrderId, MarginMode, OrderSide, PositionSide, TradeMode,
    CLIENT_ORDER_ID_MAX_LEN, CLIENT_ORDER_ID_MIN_RANDOM,
};

// Execution types
pub use execution::{
    ExecutionReport, ExecutionResult, FailureEntry, FailureStage, Order, OrderType,
    TargetCurrency,
};
