//! Trade-intent classification: did an execution open, close or roll a position?
//!
//! Each execution walks an ordered ladder of pure matchers against the prior snapshot; the
//! first rung that fires decides the label and is recorded as the match tier. In streaming
//! mode the prior quantity located by the ladder seeds a running position per instrument,
//! and an execution closes when it shrinks that position.

use crate::domain::{
    sort_executions_deterministic, Combo, Decimal, ExecutionRecord, InstrumentKey, Leg,
    MatchTier, PositionEffect, PositionSnapshot,
};
use crate::engine::clusterer::Cluster;
use chrono::NaiveDate;
use rust_decimal::Decimal as RustDecimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentMode {
    /// Running position per instrument seeded from the prior snapshot.
    Streaming,
    /// Each execution judged against the prior snapshot alone.
    RowWise,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentPolicy {
    /// Largest strike difference accepted by the tolerance tier.
    pub strike_tolerance: Decimal,
    /// Rounding applied to strikes by the exact-attribute tier and instrument keys.
    pub strike_round_dp: u32,
    /// Lower-case substrings of an order reference that mark a roll.
    pub roll_markers: Vec<String>,
    pub mode: IntentMode,
}

impl Default for IntentPolicy {
    fn default() -> Self {
        Self {
            strike_tolerance: Decimal::new(RustDecimal::new(5, 2)),
            strike_round_dp: 2,
            roll_markers: vec!["roll".to_string()],
            mode: IntentMode::Streaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentWarning {
    /// No usable prior snapshot; every leg was labelled Open.
    NoBaseline,
}

/// Label for one (expanded) execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegIntent {
    pub exec_key: String,
    pub leg_id: Option<String>,
    pub expiry: Option<NaiveDate>,
    pub effect: PositionEffect,
    pub tier: MatchTier,
    /// Quantity found in the prior snapshot by the deciding rung, if any.
    pub prior_qty: Option<Decimal>,
    /// Running position after this execution (streaming mode, complete keys only).
    pub position_after: Option<Decimal>,
}

/// Per-execution output row: leg label plus the aggregated label of its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionIntent {
    pub exec_key: String,
    pub cluster_id: Option<String>,
    pub leg_effect: PositionEffect,
    pub tier: MatchTier,
    pub position_effect: PositionEffect,
    pub is_open: bool,
    pub is_close: bool,
    pub is_roll: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComboIntent {
    pub combo_id: String,
    pub position_effect: PositionEffect,
    pub executions_n: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntentOutcome {
    pub legs: Vec<LegIntent>,
    pub warnings: Vec<IntentWarning>,
}

/// Prior legs holding a non-zero quantity.
struct PriorIndex<'a> {
    legs: Vec<&'a Leg>,
}

impl<'a> PriorIndex<'a> {
    fn new(snapshot: &'a PositionSnapshot) -> Self {
        Self {
            legs: snapshot.legs.iter().filter(|l| !l.qty.is_zero()).collect(),
        }
    }
}

type Matcher = fn(&PriorIndex<'_>, &ExecutionRecord, &IntentPolicy) -> Option<Decimal>;

/// Prior-snapshot rungs of the ladder, most confident first.
const PRIOR_LADDER: [(MatchTier, Matcher); 3] = [
    (MatchTier::IdMatch, match_id),
    (MatchTier::AttrExact, match_attr_exact),
    (MatchTier::AttrTolerance, match_attr_tolerance),
];

fn match_id(index: &PriorIndex<'_>, exec: &ExecutionRecord, _: &IntentPolicy) -> Option<Decimal> {
    let id = exec.leg_id()?;
    sum_qty(index.legs.iter().copied().filter(|l| l.leg_id == id))
}

fn match_attr_exact(
    index: &PriorIndex<'_>,
    exec: &ExecutionRecord,
    policy: &IntentPolicy,
) -> Option<Decimal> {
    let dp = policy.strike_round_dp;
    sum_qty(index.legs.iter().copied().filter(|l| {
        same_contract(l, exec)
            && match (l.strike, exec.strike) {
                (Some(a), Some(b)) => a.round_dp(dp) == b.round_dp(dp),
                (None, None) => !exec.sec_type.is_option(),
                _ => false,
            }
    }))
}

/// Nearest prior strike within tolerance; ties go to the smaller leg id.
fn match_attr_tolerance(
    index: &PriorIndex<'_>,
    exec: &ExecutionRecord,
    policy: &IntentPolicy,
) -> Option<Decimal> {
    let strike = exec.strike?;
    index
        .legs
        .iter()
        .filter(|l| same_contract(l, exec))
        .filter_map(|l| {
            let distance = (l.strike? - strike).abs();
            (distance <= policy.strike_tolerance).then_some((distance, &l.leg_id, l.qty))
        })
        .min_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)))
        .map(|(_, _, qty)| qty)
}

fn same_contract(leg: &Leg, exec: &ExecutionRecord) -> bool {
    leg.underlying == exec.underlying
        && leg.sec_type == exec.sec_type
        && leg.expiry == exec.expiry
        && leg.right == exec.right
}

fn sum_qty<'a>(legs: impl Iterator<Item = &'a Leg>) -> Option<Decimal> {
    let mut total = Decimal::zero();
    let mut any = false;
    for leg in legs {
        total += leg.qty;
        any = true;
    }
    any.then_some(total)
}

pub struct IntentClassifier {
    policy: IntentPolicy,
}

impl IntentClassifier {
    pub fn new(policy: IntentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &IntentPolicy {
        &self.policy
    }

    /// Label every execution. Output follows deterministic execution order.
    ///
    /// A missing or empty prior snapshot labels every leg Open and reports `NoBaseline`.
    pub fn classify(
        &self,
        executions: &[ExecutionRecord],
        prior: Option<&PositionSnapshot>,
    ) -> IntentOutcome {
        let mut executions = executions.to_vec();
        sort_executions_deterministic(&mut executions);

        let Some(prior) = prior.filter(|p| !p.is_flat()) else {
            warn!(
                executions = executions.len(),
                "No prior snapshot; labelling every leg Open (low confidence)"
            );
            return IntentOutcome {
                legs: executions
                    .iter()
                    .map(|e| leg_intent(e, PositionEffect::Open, MatchTier::Default, None, None))
                    .collect(),
                warnings: vec![IntentWarning::NoBaseline],
            };
        };

        let index = PriorIndex::new(prior);
        let legs = match self.policy.mode {
            IntentMode::RowWise => executions
                .iter()
                .map(|e| self.classify_row(&index, e))
                .collect(),
            IntentMode::Streaming => self.classify_streaming(&index, &executions),
        };
        IntentOutcome {
            legs,
            warnings: Vec::new(),
        }
    }

    /// Attach cluster ids and the cluster-level aggregate to each leg label.
    pub fn label_executions(
        &self,
        legs: &[LegIntent],
        clusters: &[Cluster],
    ) -> Vec<ExecutionIntent> {
        let by_key: HashMap<&str, &LegIntent> =
            legs.iter().map(|l| (l.exec_key.as_str(), l)).collect();

        let mut cluster_of: HashMap<&str, (&str, PositionEffect)> = HashMap::new();
        for cluster in clusters {
            let effect = aggregate(
                cluster
                    .exec_keys
                    .iter()
                    .filter_map(|k| by_key.get(k.as_str()))
                    .map(|l| (l.effect, l.expiry)),
            );
            for key in &cluster.exec_keys {
                cluster_of.insert(key.as_str(), (cluster.cluster_id.as_str(), effect));
            }
        }

        legs.iter()
            .map(|leg| {
                let (cluster_id, position_effect) = match cluster_of.get(leg.exec_key.as_str()) {
                    Some((id, effect)) => (Some(id.to_string()), *effect),
                    None => (None, aggregate([(leg.effect, leg.expiry)])),
                };
                ExecutionIntent {
                    exec_key: leg.exec_key.clone(),
                    cluster_id,
                    leg_effect: leg.effect,
                    tier: leg.tier,
                    position_effect,
                    is_open: position_effect == PositionEffect::Open,
                    is_close: position_effect == PositionEffect::Close,
                    is_roll: position_effect == PositionEffect::Roll,
                }
            })
            .collect()
    }

    /// Aggregate label per combo over the executions that touched its legs.
    ///
    /// Combos are read-only here.
    pub fn combo_effects(
        &self,
        combos: &[Combo],
        executions: &[ExecutionRecord],
        legs: &[LegIntent],
    ) -> Vec<ComboIntent> {
        let by_key: HashMap<&str, &LegIntent> =
            legs.iter().map(|l| (l.exec_key.as_str(), l)).collect();

        combos
            .iter()
            .map(|combo| {
                let touching: Vec<&LegIntent> = executions
                    .iter()
                    .filter(|e| combo.touches(e))
                    .filter_map(|e| by_key.get(e.exec_key().as_str()).copied())
                    .collect();
                ComboIntent {
                    combo_id: combo.combo_id.clone(),
                    position_effect: aggregate(touching.iter().map(|l| (l.effect, l.expiry))),
                    executions_n: touching.len(),
                }
            })
            .collect()
    }

    fn classify_row(&self, index: &PriorIndex<'_>, exec: &ExecutionRecord) -> LegIntent {
        if let Some(effect) = self.hint(exec) {
            return leg_intent(exec, effect, MatchTier::Hint, None, None);
        }
        match self.locate_prior(index, exec) {
            Some((tier, qty)) => leg_intent(exec, PositionEffect::Close, tier, Some(qty), None),
            None => leg_intent(exec, PositionEffect::Open, MatchTier::Default, None, None),
        }
    }

    fn classify_streaming(
        &self,
        index: &PriorIndex<'_>,
        executions: &[ExecutionRecord],
    ) -> Vec<LegIntent> {
        let mut running: HashMap<InstrumentKey, Decimal> = HashMap::new();
        let mut out = Vec::with_capacity(executions.len());

        for exec in executions {
            let Some(key) = exec.instrument_key(self.policy.strike_round_dp) else {
                out.push(self.classify_row(index, exec));
                continue;
            };

            let (before, tier, prior_qty) = match running.get(&key) {
                Some(pos) => (*pos, MatchTier::Running, None),
                None => match self.locate_prior(index, exec) {
                    Some((tier, qty)) => (qty, tier, Some(qty)),
                    None => (Decimal::zero(), MatchTier::Default, None),
                },
            };
            let after = before + exec.signed_qty();
            running.insert(key, after);

            let intent = match self.hint(exec) {
                Some(effect) => leg_intent(exec, effect, MatchTier::Hint, prior_qty, Some(after)),
                None => {
                    let effect = if after.abs() < before.abs() {
                        PositionEffect::Close
                    } else {
                        PositionEffect::Open
                    };
                    leg_intent(exec, effect, tier, prior_qty, Some(after))
                }
            };
            out.push(intent);
        }
        out
    }

    /// Roll marker in the order reference, else an explicit open/close flag.
    fn hint(&self, exec: &ExecutionRecord) -> Option<PositionEffect> {
        if let Some(order_ref) = exec.order_ref.as_deref() {
            let lower = order_ref.to_ascii_lowercase();
            if self
                .policy
                .roll_markers
                .iter()
                .any(|m| !m.is_empty() && lower.contains(m.as_str()))
            {
                return Some(PositionEffect::Roll);
            }
        }
        exec.open_close.map(PositionEffect::from)
    }

    /// First prior rung holding a non-zero quantity for this execution.
    fn locate_prior(
        &self,
        index: &PriorIndex<'_>,
        exec: &ExecutionRecord,
    ) -> Option<(MatchTier, Decimal)> {
        PRIOR_LADDER.iter().find_map(|(tier, matcher)| {
            matcher(index, exec, &self.policy)
                .filter(|q| !q.is_zero())
                .map(|q| (*tier, q))
        })
    }
}

fn leg_intent(
    exec: &ExecutionRecord,
    effect: PositionEffect,
    tier: MatchTier,
    prior_qty: Option<Decimal>,
    position_after: Option<Decimal>,
) -> LegIntent {
    LegIntent {
        exec_key: exec.exec_key(),
        leg_id: exec.leg_id(),
        expiry: exec.expiry,
        effect,
        tier,
        prior_qty,
        position_after,
    }
}

/// Aggregate leg labels (with their expiries) into a cluster/combo label.
///
/// Any Roll wins; all Open or all Close pass through; a mix is a Roll when the opened and
/// closed legs sit in different expiries, Mixed otherwise; nothing at all is Unknown.
pub fn aggregate(
    legs: impl IntoIterator<Item = (PositionEffect, Option<NaiveDate>)>,
) -> PositionEffect {
    let mut opens: BTreeSet<Option<NaiveDate>> = BTreeSet::new();
    let mut closes: BTreeSet<Option<NaiveDate>> = BTreeSet::new();
    for (effect, expiry) in legs {
        match effect {
            PositionEffect::Roll => return PositionEffect::Roll,
            PositionEffect::Open => {
                opens.insert(expiry);
            }
            PositionEffect::Close => {
                closes.insert(expiry);
            }
            PositionEffect::Mixed | PositionEffect::Unknown => {}
        }
    }

    match (opens.is_empty(), closes.is_empty()) {
        (true, true) => PositionEffect::Unknown,
        (false, true) => PositionEffect::Open,
        (true, false) => PositionEffect::Close,
        (false, false) if opens != closes => PositionEffect::Roll,
        (false, false) => PositionEffect::Mixed,
    }
}
