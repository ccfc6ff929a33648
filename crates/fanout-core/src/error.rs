//! Error types for fanout-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Quantity, size or intent field is invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential record is incomplete or malformed.
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
