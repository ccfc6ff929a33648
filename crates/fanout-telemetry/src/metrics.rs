//! Prometheus metrics for the fan-out engine.
//!
//! Covers:
//! - Executions and their instrument family
//! - Orders accepted, and failures by stage (prepare/submit/exchange)
//! - Traded volume per instrument
//! - Leverage calls and batch submission latency
//! - Rate-limiter waits and read retries
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! (e.g. duplicate metric names) is a startup bug, and these panics only occur
//! during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Executions started.
/// Labels: kind (spot/linear-perp/inverse-perp), action (open/close)
pub static EXECUTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fanout_executions_total",
        "Total trade intents executed across accounts",
        &["kind", "action"]
    )
    .unwrap()
});

/// Executions currently in flight.
pub static EXECUTIONS_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "fanout_executions_inflight",
        "Trade intents currently being executed"
    )
    .unwrap()
});

/// Orders accepted by the exchange.
pub static ORDERS_ACCEPTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fanout_orders_accepted_total",
        "Total orders accepted by the exchange",
        &["inst_id"]
    )
    .unwrap()
});

/// Failed account contributions.
/// Labels: stage (prepare/submit/exchange/missing)
pub static ORDERS_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fanout_orders_failed_total",
        "Total failed account contributions by stage",
        &["stage"]
    )
    .unwrap()
});

/// Traded volume in instrument units.
pub static TRADED_VOLUME: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fanout_traded_volume",
        "Accepted order size in instrument units",
        &["inst_id"]
    )
    .unwrap()
});

/// Leverage-set calls.
/// Labels: result (ok/error)
pub static LEVERAGE_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fanout_leverage_calls_total",
        "Total leverage-set calls",
        &["result"]
    )
    .unwrap()
});

/// Batch submission latency in milliseconds.
pub static SUBMISSION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fanout_submission_latency_ms",
        "Signed batch submission latency in milliseconds",
        &["result"],
        vec![10.0, 25.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0]
    )
    .unwrap()
});

/// Time spent waiting on the rate limiter in milliseconds.
pub static RATE_LIMIT_WAIT_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fanout_rate_limit_wait_ms",
        "Time spent waiting for rate-limit capacity in milliseconds",
        &["endpoint"],
        vec![0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 2000.0]
    )
    .unwrap()
});

/// Retried read calls.
pub static READ_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fanout_read_retries_total",
        "Total retried idempotent read calls",
        &["operation"]
    )
    .unwrap()
});

/// Helper to record metrics.
pub struct Metrics;

impl Metrics {
    /// Record an execution start.
    pub fn execution_started(kind: &str, action: &str) {
        EXECUTIONS_TOTAL.with_label_values(&[kind, action]).inc();
        EXECUTIONS_INFLIGHT.inc();
    }

    /// Record an execution end.
    pub fn execution_finished() {
        EXECUTIONS_INFLIGHT.dec();
    }

    /// Record an accepted order and its size.
    pub fn order_accepted(inst_id: &str, size: f64) {
        ORDERS_ACCEPTED_TOTAL.with_label_values(&[inst_id]).inc();
        TRADED_VOLUME.with_label_values(&[inst_id]).inc_by(size.max(0.0));
    }

    /// Record a failed account contribution.
    pub fn order_failed(stage: &str) {
        ORDERS_FAILED_TOTAL.with_label_values(&[stage]).inc();
    }

    pub fn leverage_call(ok: bool) {
        let result = if ok { "ok" } else { "error" };
        LEVERAGE_CALLS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn submission_latency(ok: bool, latency_ms: f64) {
        let result = if ok { "ok" } else { "error" };
        SUBMISSION_LATENCY_MS
            .with_label_values(&[result])
            .observe(latency_ms);
    }

    pub fn rate_limit_wait(endpoint: &str, wait_ms: f64) {
        RATE_LIMIT_WAIT_MS
            .with_label_values(&[endpoint])
            .observe(wait_ms);
    }

    pub fn read_retry(operation: &str) {
        READ_RETRIES_TOTAL.with_label_values(&[operation]).inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
