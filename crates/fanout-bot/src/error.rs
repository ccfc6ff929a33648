//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Account file error: {0}")]
    Accounts(String),

    #[error("Intent error: {0}")]
    Intent(String),

    #[error("Core error: {0}")]
    Core(#[from] fanout_core::CoreError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] fanout_exchange::ExchangeError),

    #[error("Executor error: {0}")]
    Executor(#[from] fanout_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] fanout_telemetry::TelemetryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
