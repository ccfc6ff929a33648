//! Command-line runner for the multi-account order fan-out engine.
//!
//! Loads configuration, the account list and one or more webhook payloads,
//! runs a single execution and hands the report back as JSON.

pub mod app;
pub mod config;
pub mod error;

pub use app::{load_accounts, parse_intents, read_intents, Application, STDIN_SOURCE};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
