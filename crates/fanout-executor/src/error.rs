//! Executor error types.
//!
//! Every variant except [`ExecutorError::NoAccounts`] describes one account's
//! failed contribution and ends up in the execution report, never in a
//! returned `Err`.

use thiserror::Error;

use fanout_core::CoreError;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Quantity or computed size is invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credential error: {0}")]
    Credential(String),

    /// Lot size or max size could not be read.
    #[error("Instrument lookup failed for {inst_id}: {reason}")]
    InstrumentLookup { inst_id: String, reason: String },

    /// Close requested but the account holds no position.
    #[error("No open position for {0}")]
    PositionNotFound(String),

    #[error("Leverage rejected for {inst_id}: {reason}")]
    Leverage { inst_id: String, reason: String },

    /// The signed batch call itself failed.
    #[error("Batch submission failed: {0}")]
    Submission(String),

    /// One order inside an accepted batch was rejected.
    #[error("Order rejected by exchange ({code}): {message}")]
    ExchangeOrder { code: String, message: String },

    /// Structural misuse: nothing to execute against.
    #[error("No accounts supplied")]
    NoAccounts,
}

impl From<CoreError> for ExecutorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Credential(msg) => Self::Credential(msg),
            CoreError::DecimalParse(e) => Self::Validation(e.to_string()),
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
