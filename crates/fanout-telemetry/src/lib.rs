//! Prometheus metrics and structured logging for the fan-out engine.
//!
//! - Prometheus metrics for executions, submissions, leverage calls and pacing
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
