//! Result aggregation.
//!
//! Merges per-account outcomes into an [`ExecutionReport`]. Every expected
//! (intent, account) pair ends up in the report exactly once; a pair with no
//! recorded outcome becomes a failure instead of disappearing.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use tracing::{error, warn};

use fanout_core::{ExecutionReport, ExecutionResult, FailureEntry, FailureStage, Size};
use fanout_telemetry::Metrics;

use crate::batch::Member;

struct Slot {
    account: String,
    inst_id: String,
    result: Option<ExecutionResult>,
}

/// Collects outcomes for one execution.
#[derive(Default)]
pub struct ResultAggregator {
    slots: BTreeMap<Member, Slot>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pair that must produce an outcome.
    pub fn expect(&mut self, member: Member, masked_account: String, inst_id: String) {
        self.slots.insert(
            member,
            Slot {
                account: masked_account,
                inst_id,
                result: None,
            },
        );
    }

    /// Record the outcome for `member`. The first outcome wins.
    pub fn record(&mut self, member: Member, result: ExecutionResult) {
        match self.slots.get_mut(&member) {
            Some(slot) if slot.result.is_none() => slot.result = Some(result),
            Some(_) => warn!(
                intent = member.intent,
                account = %result.account,
                "Duplicate outcome ignored"
            ),
            None => warn!(
                intent = member.intent,
                account = %result.account,
                "Outcome for unexpected account ignored"
            ),
        }
    }

    pub fn record_all(&mut self, outcomes: impl IntoIterator<Item = (Member, ExecutionResult)>) {
        for (member, result) in outcomes {
            self.record(member, result);
        }
    }

    /// Build the report. Never fails.
    pub fn finish(self) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for (member, slot) in self.slots {
            let result = slot.result.unwrap_or_else(|| {
                error!(
                    intent = member.intent,
                    account = %slot.account,
                    inst_id = %slot.inst_id,
                    "No outcome recorded for account"
                );
                ExecutionResult::failed(
                    slot.account.clone(),
                    slot.inst_id.clone(),
                    FailureStage::Missing,
                    "no outcome recorded",
                )
            });

            if result.success {
                report.successful += 1;
                report.total_volume = report.total_volume + result.volume;
                Metrics::order_accepted(
                    &result.inst_id,
                    result.volume.inner().to_f64().unwrap_or(0.0),
                );
            } else {
                report.failed += 1;
                let stage = result.stage.unwrap_or(FailureStage::Missing);
                Metrics::order_failed(stage.as_str());
                report.failures.push(FailureEntry {
                    account: result.account.clone(),
                    inst_id: result.inst_id.clone(),
                    stage,
                    error: result.error.clone().unwrap_or_default(),
                });
            }
            report.results.push(result);
        }

        report
    }
}

/// Sum of successful volumes.
pub fn total_volume(results: &[ExecutionResult]) -> Size {
    results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.volume)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn member(account: usize) -> Member {
        Member { intent: 0, account }
    }

    fn success(account: &str, volume: rust_decimal::Decimal) -> ExecutionResult {
        ExecutionResult {
            account: account.to_string(),
            inst_id: "BTC-USDT-SWAP".to_string(),
            success: true,
            volume: Size::new(volume),
            client_order_id: None,
            order_id: Some("1".to_string()),
            stage: None,
            error: None,
        }
    }

    #[test]
    fn test_partition_and_volume() {
        let mut agg = ResultAggregator::new();
        for i in 0..3 {
            agg.expect(member(i), format!("acct{i}..."), "BTC-USDT-SWAP".to_string());
        }
        agg.record(member(0), success("acct0...", dec!(1.5)));
        agg.record(member(1), success("acct1...", dec!(2.25)));
        agg.record(
            member(2),
            ExecutionResult::failed(
                "acct2...".to_string(),
                "BTC-USDT-SWAP",
                FailureStage::Prepare,
                "Leverage rejected",
            ),
        );

        let report = agg.finish();
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total_volume.to_wire(), "3.75");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].account, "acct2...");
        assert_eq!(report.failures[0].stage, FailureStage::Prepare);
        assert_eq!(total_volume(&report.results), report.total_volume);
    }

    #[test]
    fn test_missing_outcome_is_surfaced() {
        let mut agg = ResultAggregator::new();
        agg.expect(member(0), "acct0...".to_string(), "BTC-USDT".to_string());
        agg.expect(member(1), "acct1...".to_string(), "BTC-USDT".to_string());
        agg.record(member(0), success("acct0...", dec!(1)));

        let report = agg.finish();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].stage, FailureStage::Missing);
        assert_eq!(report.failures[0].error, "no outcome recorded");
    }

    #[test]
    fn test_first_outcome_wins() {
        let mut agg = ResultAggregator::new();
        agg.expect(member(0), "acct0...".to_string(), "BTC-USDT".to_string());
        agg.record(member(0), success("acct0...", dec!(1)));
        agg.record(
            member(0),
            ExecutionResult::failed("acct0...".to_string(), "BTC-USDT", FailureStage::Submit, "x"),
        );
        let report = agg.finish();
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_empty_report() {
        let report = ResultAggregator::new().finish();
        assert!(report.results.is_empty());
        assert!(report.total_volume.is_zero());
        assert!(!report.all_succeeded());
    }
}
