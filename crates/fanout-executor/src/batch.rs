//! Batch planning.
//!
//! Groups (intent, account) pairs by resolved instrument and chunks each group
//! to the exchange batch limit. A chunk is the unit of preparation and pacing;
//! submission inside a chunk is regrouped per account so a signed batch never
//! mixes accounts.

use std::collections::BTreeMap;

use fanout_core::{InstrumentKind, MarginMode, Order, PositionSide, TradeAction, TradeIntent};

/// Exchange limit on orders per batch submission.
pub const MAX_BATCH_ORDERS: usize = 20;

// ============================================================================
// Planning
// ============================================================================

/// One account's participation in one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Member {
    pub intent: usize,
    pub account: usize,
}

/// Members sharing one resolved instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentGroup {
    pub inst_id: String,
    pub kind: InstrumentKind,
    pub members: Vec<Member>,
}

impl InstrumentGroup {
    /// Chunks of at most `limit` members, in account order.
    pub fn chunks(&self, limit: usize) -> std::slice::Chunks<'_, Member> {
        self.members.chunks(limit.max(1))
    }

    pub fn chunk_count(&self, limit: usize) -> usize {
        self.members.len().div_ceil(limit.max(1))
    }
}

/// Intent that failed validation or instrument resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub intent: usize,
    pub symbol: String,
    pub reason: String,
}

/// Execution plan for a set of intents over a set of accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub groups: Vec<InstrumentGroup>,
    pub unresolved: Vec<Unresolved>,
}

/// Leverage an intent sets on one instrument before its orders go out.
#[derive(Debug, Clone, Copy)]
struct LeverageClaim {
    intent: usize,
    margin_mode: MarginMode,
    /// `None` covers both sides: cross leverage and closes of an unknown leg.
    pos_side: Option<PositionSide>,
    leverage: u32,
}

impl LeverageClaim {
    fn for_intent(
        intent_idx: usize,
        intent: &TradeIntent,
        default_leverage: u32,
    ) -> Option<Self> {
        if !intent.kind().is_derivative() {
            return None;
        }
        let margin_mode = intent.margin_mode();
        let pos_side = match (intent.action(), margin_mode) {
            (TradeAction::Open { side, .. }, MarginMode::Isolated) => {
                Some(PositionSide::for_open(side))
            }
            _ => None,
        };
        Some(Self {
            intent: intent_idx,
            margin_mode,
            pos_side,
            leverage: intent.leverage().unwrap_or(default_leverage),
        })
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        self.margin_mode == other.margin_mode
            && self.leverage != other.leverage
            && match (self.pos_side, other.pos_side) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

/// Group every (intent, account) pair by resolved instrument id.
///
/// Groups come out in instrument-id order; members in intent then account
/// order. A derivative intent whose effective leverage differs from an
/// earlier intent's on the same instrument, margin mode and position side is
/// unresolved: both would set leverage on the same position before a shared
/// batch, so the earlier one keeps the instrument.
pub fn plan_groups(
    intents: &[TradeIntent],
    account_count: usize,
    default_leverage: u32,
) -> BatchPlan {
    let mut groups: BTreeMap<String, InstrumentGroup> = BTreeMap::new();
    let mut claims: BTreeMap<String, Vec<LeverageClaim>> = BTreeMap::new();
    let mut unresolved = Vec::new();

    for (intent_idx, intent) in intents.iter().enumerate() {
        let inst_id = match intent.validate().and_then(|()| intent.instrument_id()) {
            Ok(inst_id) => inst_id,
            Err(e) => {
                unresolved.push(Unresolved {
                    intent: intent_idx,
                    symbol: intent.symbol().to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if let Some(claim) = LeverageClaim::for_intent(intent_idx, intent, default_leverage) {
            let held = claims.entry(inst_id.clone()).or_default();
            if let Some(earlier) = held.iter().find(|c| c.conflicts_with(&claim)) {
                unresolved.push(Unresolved {
                    intent: intent_idx,
                    symbol: intent.symbol().to_string(),
                    reason: format!(
                        "leverage {} conflicts with leverage {} of intent {} on {inst_id}",
                        claim.leverage, earlier.leverage, earlier.intent
                    ),
                });
                continue;
            }
            held.push(claim);
        }

        let group = groups
            .entry(inst_id.clone())
            .or_insert_with(|| InstrumentGroup {
                inst_id,
                kind: intent.kind(),
                members: Vec::new(),
            });
        group
            .members
            .extend((0..account_count).map(|account| Member {
                intent: intent_idx,
                account,
            }));
    }

    BatchPlan {
        groups: groups.into_values().collect(),
        unresolved,
    }
}

/// Regroup a chunk's prepared orders per account, then split each account's
/// orders into signed submissions of at most `limit` orders.
pub fn per_account_submissions(
    prepared: Vec<(Member, Order)>,
    limit: usize,
) -> Vec<(usize, Vec<(Member, Order)>)> {
    let mut by_account: BTreeMap<usize, Vec<(Member, Order)>> = BTreeMap::new();
    for (member, order) in prepared {
        by_account.entry(member.account).or_default().push((member, order));
    }

    let limit = limit.max(1);
    let mut submissions = Vec::new();
    for (account, mut orders) in by_account {
        while !orders.is_empty() {
            let rest = orders.split_off(orders.len().min(limit));
            submissions.push((account, orders));
            orders = rest;
        }
    }
    submissions
}
