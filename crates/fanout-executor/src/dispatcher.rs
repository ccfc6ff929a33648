//! Multi-account batch dispatch.
//!
//! One execution fans a trade intent out over every account:
//!
//! 1. Plan: group (intent, account) pairs by resolved instrument
//! 2. Per group (groups run concurrently): read the lot size once, then walk
//!    the chunks sequentially
//! 3. Per chunk: prepare every account's order concurrently with that
//!    account's own credentials; failures are excluded from submission
//! 4. Submit: one signed batch call per account, calls for different accounts
//!    run concurrently, each paced by the injected [`RateLimit`]
//! 5. Aggregate every outcome into an [`ExecutionReport`]
//!
//! Business failures never surface as `Err`; only structural misuse does.
//!
//! [`RateLimit`]: fanout_exchange::RateLimit

use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use fanout_core::{
    validate_order_prefix, Credentials, ExecutionReport, ExecutionResult, FailureStage, Order,
    Size, TradeIntent, DEFAULT_LEVERAGE, MAX_LEVERAGE,
};
use fanout_exchange::{
    DynExchange, DynRateLimit, Endpoint, MarketReader, OrderAck, RetryConfig,
};
use fanout_telemetry::Metrics;

use crate::aggregator::ResultAggregator;
use crate::batch::{per_account_submissions, plan_groups, InstrumentGroup, Member, MAX_BATCH_ORDERS};
use crate::builder::OrderBuilder;
use crate::error::{ExecutorError, ExecutorResult};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Chunk size and per-call order limit (1..=20).
    pub max_orders_per_batch: usize,
    /// Floor pause between chunks of one group.
    pub chunk_pause: Duration,
    /// Client order id prefix (1-16 alphanumeric characters).
    pub client_order_prefix: String,
    /// Leverage used when an intent carries none.
    pub default_leverage: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_orders_per_batch: MAX_BATCH_ORDERS,
            chunk_pause: Duration::ZERO,
            client_order_prefix: "fanout".to_string(),
            default_leverage: DEFAULT_LEVERAGE,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> ExecutorResult<()> {
        validate_order_prefix(&self.client_order_prefix)?;
        if !(1..=MAX_BATCH_ORDERS).contains(&self.max_orders_per_batch) {
            return Err(ExecutorError::Validation(format!(
                "max_orders_per_batch must be between 1 and {MAX_BATCH_ORDERS}, got {}",
                self.max_orders_per_batch
            )));
        }
        if self.default_leverage == 0 || self.default_leverage > MAX_LEVERAGE {
            return Err(ExecutorError::Validation(format!(
                "default_leverage must be between 1 and {MAX_LEVERAGE}, got {}",
                self.default_leverage
            )));
        }
        Ok(())
    }
}

/// Fans trade intents out over accounts.
pub struct Dispatcher {
    api: DynExchange,
    limiter: DynRateLimit,
    reader: MarketReader,
    builder: OrderBuilder,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher. Fails on an invalid configuration.
    pub fn new(
        api: DynExchange,
        limiter: DynRateLimit,
        retry: RetryConfig,
        config: DispatcherConfig,
    ) -> ExecutorResult<Self> {
        config.validate()?;
        let reader = MarketReader::new(api.clone(), limiter.clone(), retry);
        let builder = OrderBuilder::new(
            reader.clone(),
            api.clone(),
            limiter.clone(),
            config.client_order_prefix.clone(),
            config.default_leverage,
        );
        Ok(Self {
            api,
            limiter,
            reader,
            builder,
            config,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Execute one intent for every account.
    pub async fn execute(
        &self,
        intent: &TradeIntent,
        accounts: &[Credentials],
    ) -> ExecutorResult<ExecutionReport> {
        self.execute_many(std::slice::from_ref(intent), accounts)
            .await
    }

    /// Execute every intent for every account.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::NoAccounts`] when `accounts` is empty and
    /// [`ExecutorError::Validation`] when `intents` is empty. Everything else
    /// is reported per account inside the returned report.
    pub async fn execute_many(
        &self,
        intents: &[TradeIntent],
        accounts: &[Credentials],
    ) -> ExecutorResult<ExecutionReport> {
        if accounts.is_empty() {
            return Err(ExecutorError::NoAccounts);
        }
        if intents.is_empty() {
            return Err(ExecutorError::Validation(
                "no trade intents supplied".to_string(),
            ));
        }

        for intent in intents {
            let action = if intent.is_close() { "close" } else { "open" };
            Metrics::execution_started(&intent.kind().to_string(), action);
        }

        let plan = plan_groups(intents, accounts.len(), self.config.default_leverage);
        info!(
            intents = intents.len(),
            accounts = accounts.len(),
            groups = plan.groups.len(),
            unresolved = plan.unresolved.len(),
            "Starting execution"
        );

        let mut aggregator = ResultAggregator::new();
        for group in &plan.groups {
            for member in &group.members {
                aggregator.expect(
                    *member,
                    accounts[member.account].masked_id(),
                    group.inst_id.clone(),
                );
            }
        }

        for unresolved in &plan.unresolved {
            warn!(
                intent = unresolved.intent,
                symbol = %unresolved.symbol,
                reason = %unresolved.reason,
                "Intent rejected before preparation"
            );
            let err = ExecutorError::Validation(unresolved.reason.clone());
            for (idx, creds) in accounts.iter().enumerate() {
                let member = Member {
                    intent: unresolved.intent,
                    account: idx,
                };
                aggregator.expect(member, creds.masked_id(), unresolved.symbol.clone());
                aggregator.record(
                    member,
                    ExecutionResult::failed(
                        creds.masked_id(),
                        unresolved.symbol.clone(),
                        FailureStage::Prepare,
                        err.to_string(),
                    ),
                );
            }
        }

        let group_outcomes = join_all(
            plan.groups
                .iter()
                .map(|group| self.run_group(group, intents, accounts)),
        )
        .await;
        for outcomes in group_outcomes {
            aggregator.record_all(outcomes);
        }

        let report = aggregator.finish();
        for _ in intents {
            Metrics::execution_finished();
        }
        info!(
            successful = report.successful,
            failed = report.failed,
            total_volume = %report.total_volume,
            "Execution finished: {}",
            report.summary_line()
        );
        Ok(report)
    }

    /// Run every chunk of one instrument group, sequentially.
    async fn run_group(
        &self,
        group: &InstrumentGroup,
        intents: &[TradeIntent],
        accounts: &[Credentials],
    ) -> Vec<(Member, ExecutionResult)> {
        let lot_size = match self.reader.get_lot_size(group.kind, &group.inst_id).await {
            Ok(info) => info.lot_size,
            Err(e) => {
                let err = ExecutorError::InstrumentLookup {
                    inst_id: group.inst_id.clone(),
                    reason: e.to_string(),
                };
                warn!(
                    inst_id = %group.inst_id,
                    members = group.members.len(),
                    error = %err,
                    "Lot size unavailable, failing group"
                );
                return group
                    .members
                    .iter()
                    .map(|member| {
                        (
                            *member,
                            ExecutionResult::failed(
                                accounts[member.account].masked_id(),
                                group.inst_id.clone(),
                                FailureStage::Prepare,
                                err.to_string(),
                            ),
                        )
                    })
                    .collect();
            }
        };

        let limit = self.config.max_orders_per_batch;
        let chunk_count = group.chunk_count(limit);
        let mut outcomes = Vec::with_capacity(group.members.len());
        for (chunk_idx, chunk) in group.chunks(limit).enumerate() {
            if chunk_idx > 0 && !self.config.chunk_pause.is_zero() {
                tokio::time::sleep(self.config.chunk_pause).await;
            }
            debug!(
                inst_id = %group.inst_id,
                chunk = chunk_idx,
                of = chunk_count,
                size = chunk.len(),
                "Running chunk"
            );
            outcomes.extend(
                self.run_chunk(group, chunk_idx, chunk, lot_size, intents, accounts)
                    .await,
            );
        }
        outcomes
    }

    /// Prepare a chunk concurrently, then submit per account.
    async fn run_chunk(
        &self,
        group: &InstrumentGroup,
        chunk_idx: usize,
        chunk: &[Member],
        lot_size: Size,
        intents: &[TradeIntent],
        accounts: &[Credentials],
    ) -> Vec<(Member, ExecutionResult)> {
        let inst_id = group.inst_id.as_str();
        let prepared = join_all(chunk.iter().map(|member| async move {
            let result = self
                .builder
                .prepare(
                    &intents[member.intent],
                    inst_id,
                    lot_size,
                    &accounts[member.account],
                )
                .await;
            (*member, result)
        }))
        .await;

        let mut outcomes = Vec::with_capacity(chunk.len());
        let mut ready = Vec::with_capacity(chunk.len());
        for (member, result) in prepared {
            match result {
                Ok(order) => ready.push((member, order)),
                Err(e) => {
                    let account = accounts[member.account].masked_id();
                    warn!(
                        account = %account,
                        inst_id,
                        chunk = chunk_idx,
                        error = %e,
                        "Order preparation failed, account excluded from batch"
                    );
                    outcomes.push((
                        member,
                        ExecutionResult::failed(
                            account,
                            inst_id,
                            FailureStage::Prepare,
                            e.to_string(),
                        ),
                    ));
                }
            }
        }

        if ready.is_empty() {
            debug!(inst_id, chunk = chunk_idx, "No orders prepared, chunk skipped");
            return outcomes;
        }

        let submissions = per_account_submissions(ready, self.config.max_orders_per_batch);
        let submitted = join_all(
            submissions
                .into_iter()
                .map(|(account, orders)| self.submit(&accounts[account], orders)),
        )
        .await;
        outcomes.extend(submitted.into_iter().flatten());
        outcomes
    }

    /// One signed batch call for one account. Never retried.
    async fn submit(
        &self,
        creds: &Credentials,
        orders: Vec<(Member, Order)>,
    ) -> Vec<(Member, ExecutionResult)> {
        let account = creds.masked_id();
        let (members, batch): (Vec<Member>, Vec<Order>) = orders.into_iter().unzip();

        self.limiter
            .acquire(Endpoint::BatchOrders, creds.access_key())
            .await;
        let started = Instant::now();
        let response = self.api.place_batch(creds, &batch).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        Metrics::submission_latency(response.is_ok(), latency_ms);

        match response {
            Ok(acks) => {
                info!(
                    account = %account,
                    orders = batch.len(),
                    latency_ms,
                    "Batch submitted"
                );
                members
                    .into_iter()
                    .zip(&batch)
                    .enumerate()
                    .map(|(idx, (member, order))| {
                        let result = match find_ack(&acks, idx, order) {
                            Some(ack) => ack_outcome(account.clone(), order, ack),
                            None => {
                                error!(
                                    account = %account,
                                    client_order_id = %order.client_order_id,
                                    "Batch response carries no acknowledgement for order"
                                );
                                ExecutionResult::failed(
                                    account.clone(),
                                    order.inst_id.clone(),
                                    FailureStage::Missing,
                                    "no acknowledgement in batch response",
                                )
                                .with_client_order_id(&order.client_order_id)
                            }
                        };
                        (member, result)
                    })
                    .collect()
            }
            Err(e) => {
                let err = ExecutorError::Submission(e.to_string());
                error!(
                    account = %account,
                    orders = batch.len(),
                    error = %e,
                    "Batch submission failed"
                );
                members
                    .into_iter()
                    .zip(&batch)
                    .map(|(member, order)| {
                        (
                            member,
                            ExecutionResult::failed(
                                account.clone(),
                                order.inst_id.clone(),
                                FailureStage::Submit,
                                err.to_string(),
                            )
                            .with_client_order_id(&order.client_order_id),
                        )
                    })
                    .collect()
            }
        }
    }
}

/// Match an ack by client order id; fall back to position when the exchange
/// omits the id.
fn find_ack<'a>(acks: &'a [OrderAck], idx: usize, order: &Order) -> Option<&'a OrderAck> {
    acks.iter()
        .find(|ack| ack.client_order_id == order.client_order_id.as_str())
        .or_else(|| acks.get(idx).filter(|ack| ack.client_order_id.is_empty()))
}

fn ack_outcome(account: String, order: &Order, ack: &OrderAck) -> ExecutionResult {
    if ack.is_success() {
        let order_id = (!ack.order_id.is_empty()).then(|| ack.order_id.clone());
        return ExecutionResult::accepted(account, order, order_id);
    }
    let err = ExecutorError::ExchangeOrder {
        code: ack.code.clone(),
        message: ack.message.clone(),
    };
    warn!(
        account = %account,
        client_order_id = %order.client_order_id,
        code = %ack.code,
        "Order rejected by exchange"
    );
    ExecutionResult::failed(account, order.inst_id.clone(), FailureStage::Exchange, err.to_string())
        .with_client_order_id(&order.client_order_id)
}
