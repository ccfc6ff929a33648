//! Application wiring.
//!
//! Loads accounts and intents at the trust boundary, builds the signed
//! client, limiter and dispatcher from configuration, and runs one execution.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use fanout_core::{Credentials, ExecutionReport, RawCredentials, TradeIntent, WebhookPayload};
use fanout_exchange::{DynExchange, DynRateLimit, OkxRestClient, TokenBucketLimiter};
use fanout_executor::Dispatcher;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Intent source reading from stdin.
pub const STDIN_SOURCE: &str = "-";

/// One payload or a list of payloads.
#[derive(Deserialize)]
#[serde(untagged)]
enum IntentDocument {
    One(WebhookPayload),
    Many(Vec<WebhookPayload>),
}

/// Main application.
pub struct Application {
    config: AppConfig,
    dispatcher: Dispatcher,
}

impl Application {
    /// Create the application against the real exchange.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = OkxRestClient::new(config.client_config())?;
        let limiter = TokenBucketLimiter::new(config.rate_limits.rules());
        Self::with_exchange(config, Arc::new(client), Arc::new(limiter))
    }

    /// Create the application with injected exchange and limiter.
    pub fn with_exchange(
        config: AppConfig,
        api: DynExchange,
        limiter: DynRateLimit,
    ) -> AppResult<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(
            api,
            limiter,
            config.retry.clone(),
            config.dispatcher_config(),
        )?;
        Ok(Self { config, dispatcher })
    }

    /// Run every intent against every configured account.
    pub async fn run(&self, intents: &[TradeIntent]) -> AppResult<ExecutionReport> {
        let accounts = load_accounts(&self.config.accounts_file)?;
        info!(
            accounts = accounts.len(),
            intents = intents.len(),
            simulated = self.config.exchange.simulated,
            "Dispatching"
        );

        let report = self.dispatcher.execute_many(intents, &accounts).await?;

        for failure in &report.failures {
            warn!(
                account = %failure.account,
                inst_id = %failure.inst_id,
                stage = failure.stage.as_str(),
                error = %failure.error,
                "Account failed"
            );
        }
        info!(summary = %report.summary_line(), "Execution complete");
        Ok(report)
    }
}

/// Load the account list from a JSON array of credential records.
///
/// Every record must be complete; the first incomplete one fails the load.
pub fn load_accounts(path: impl AsRef<Path>) -> AppResult<Vec<Credentials>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Accounts(format!("Failed to read {}: {e}", path.display()))
    })?;
    let records: Vec<RawCredentials> = serde_json::from_str(&content)
        .map_err(|e| AppError::Accounts(format!("Failed to parse {}: {e}", path.display())))?;

    records
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| {
            Credentials::try_from(raw)
                .map_err(|e| AppError::Accounts(format!("record {idx}: {e}")))
        })
        .collect()
}

/// Parse one webhook payload or an array of them.
pub fn parse_intents(json: &str) -> AppResult<Vec<TradeIntent>> {
    let payloads = match serde_json::from_str::<IntentDocument>(json)
        .map_err(|e| AppError::Intent(format!("Failed to parse payload: {e}")))?
    {
        IntentDocument::One(payload) => vec![payload],
        IntentDocument::Many(payloads) => payloads,
    };
    if payloads.is_empty() {
        return Err(AppError::Intent("no payloads supplied".to_string()));
    }

    payloads
        .into_iter()
        .enumerate()
        .map(|(idx, payload)| {
            TradeIntent::try_from(payload)
                .map_err(|e| AppError::Intent(format!("payload {idx}: {e}")))
        })
        .collect()
}

/// Read intents from a file, or from stdin when `source` is `-`.
pub fn read_intents(source: &str) -> AppResult<Vec<TradeIntent>> {
    let json = if source == STDIN_SOURCE {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| AppError::Intent(format!("Failed to read {source}: {e}")))?
    };
    parse_intents(&json)
}
