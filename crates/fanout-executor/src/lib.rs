//! Multi-account order execution.
//!
//! Turns one trade intent into one order per account and submits them in
//! per-account signed batches.
//!
//! # Key Components
//!
//! - [`resolve_size`]: Percentage/absolute quantity to a lot-aligned size
//! - [`OrderBuilder`]: Per-account order preparation, leverage included
//! - [`plan_groups`]: Instrument grouping and chunking
//! - [`Dispatcher`]: Concurrent preparation and batch submission
//! - [`ResultAggregator`]: Flat report with masked failures
//!
//! # Failure Scope
//!
//! 1. Intent validation or leverage conflict -> every account of that intent
//!    fails at `prepare`
//! 2. Lot size lookup -> every account of that instrument fails at `prepare`
//! 3. Sizing / leverage / position -> that account fails at `prepare`
//! 4. Signed batch call -> that account's orders in the call fail at `submit`
//! 5. Per-order code -> that order fails at `exchange`

pub mod aggregator;
pub mod batch;
pub mod builder;
pub mod dispatcher;
pub mod error;
pub mod sizing;

pub use aggregator::{total_volume, ResultAggregator};
pub use batch::{
    per_account_submissions, plan_groups, BatchPlan, InstrumentGroup, Member, Unresolved,
    MAX_BATCH_ORDERS,
};
pub use builder::OrderBuilder;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{ExecutorError, ExecutorResult};
pub use sizing::{resolve_size, round_to_lot_size};
