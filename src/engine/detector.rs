//! Grouping legs into multi-leg structures.
//!
//! Rules run in a fixed priority order and each rule consumes the legs it matches, so every
//! input leg ends up in exactly one combo. Whole-bucket patterns (iron condor, butterfly)
//! are tried before pairwise ones; otherwise every condor would be split into two verticals.

use crate::domain::{
    sort_legs_deterministic, Combo, CreditDebit, Decimal, Leg, Right, Structure, Underlying,
};
use crate::engine::identity::ComboIdentity;
use chrono::NaiveDate;
use rust_decimal::Decimal as RustDecimal;
use std::collections::{BTreeMap, HashMap};

/// Tunable constants for structure detection.
///
/// These are heuristics, not invariants; keep them configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorPolicy {
    /// Butterfly symmetry tolerance as a share of the outer strike range.
    pub butterfly_tolerance_pct: Decimal,
    /// Absolute lower bound on the butterfly symmetry tolerance.
    pub butterfly_tolerance_floor: Decimal,
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            butterfly_tolerance_pct: Decimal::new(RustDecimal::new(5, 2)),
            butterfly_tolerance_floor: Decimal::new(RustDecimal::new(1, 2)),
        }
    }
}

/// Structure label plus width for an arbitrary leg set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub structure: Structure,
    pub width: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct ComboDetector {
    policy: DetectorPolicy,
}

/// A matched leg group before identity and derived fields are attached.
struct Draft {
    structure: Structure,
    legs: Vec<Leg>,
    width: Option<Decimal>,
}

impl Draft {
    fn single(leg: Leg) -> Self {
        Draft {
            structure: Structure::Single,
            legs: vec![leg],
            width: None,
        }
    }
}

impl ComboDetector {
    pub fn new(policy: DetectorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DetectorPolicy {
        &self.policy
    }

    /// Partition legs into non-overlapping combos, independently per underlying.
    ///
    /// Lines sharing a leg id (lots of one contract) are netted into a single leg first.
    /// Output is ordered by underlying, then expiry, then combo id.
    pub fn detect(&self, legs: &[Leg]) -> Vec<Combo> {
        let mut by_underlying: BTreeMap<Underlying, Vec<Leg>> = BTreeMap::new();
        for leg in legs {
            by_underlying
                .entry(leg.underlying.clone())
                .or_default()
                .push(leg.clone());
        }

        by_underlying
            .into_iter()
            .flat_map(|(underlying, legs)| {
                self.detect_underlying(&underlying, net_by_leg_id(&legs))
            })
            .collect()
    }

    /// Label a leg set as a whole.
    ///
    /// Legs sharing an identifier are netted first (a cluster may trade the same contract
    /// twice). One combo covering everything yields its label and width; anything that
    /// splits into several combos is `Synthetic`.
    pub fn classify_group(&self, legs: &[Leg]) -> Classification {
        let netted = net_by_leg_id(legs);
        let Some(first) = netted.first() else {
            return Classification {
                structure: Structure::Synthetic,
                width: None,
            };
        };
        if netted.iter().any(|l| l.underlying != first.underlying) {
            return Classification {
                structure: Structure::Synthetic,
                width: strike_range(&netted),
            };
        }

        let underlying = first.underlying.clone();
        let combos = self.detect_underlying(&underlying, netted.clone());
        match combos.as_slice() {
            [only] => Classification {
                structure: only.structure,
                width: only.width,
            },
            _ => Classification {
                structure: Structure::Synthetic,
                width: strike_range(&netted),
            },
        }
    }

    fn detect_underlying(&self, underlying: &Underlying, mut legs: Vec<Leg>) -> Vec<Combo> {
        sort_legs_deterministic(&mut legs);
        let (options, others): (Vec<Leg>, Vec<Leg>) =
            legs.into_iter().partition(|l| l.is_option());

        let mut used = vec![false; options.len()];
        let mut drafts = Vec::new();

        for (i, leg) in options.iter().enumerate() {
            if !leg.is_classifiable_option() {
                used[i] = true;
                drafts.push(Draft::single(leg.clone()));
            }
        }

        self.match_iron_condors(&options, &mut used, &mut drafts);
        self.match_butterflies(&options, &mut used, &mut drafts);
        match_verticals(&options, &mut used, &mut drafts);
        match_straddles(&options, &mut used, &mut drafts, true);
        match_straddles(&options, &mut used, &mut drafts, false);
        match_cross_expiry(&options, &mut used, &mut drafts, true);
        match_cross_expiry(&options, &mut used, &mut drafts, false);

        for (i, leg) in options.iter().enumerate() {
            if !used[i] {
                drafts.push(Draft::single(leg.clone()));
            }
        }

        attach_non_options(&mut drafts, others);

        let mut combos: Vec<Combo> = drafts
            .into_iter()
            .map(|d| finalize(underlying, d))
            .collect();
        combos.sort_by(|a, b| (a.expiry, &a.combo_id).cmp(&(b.expiry, &b.combo_id)));
        combos
    }

    fn match_iron_condors(&self, options: &[Leg], used: &mut [bool], drafts: &mut Vec<Draft>) {
        for bucket in expiry_buckets(options, used).into_values() {
            if bucket.len() != 4 {
                continue;
            }
            let calls: Vec<Decimal> = strikes_for(options, &bucket, Right::Call);
            let puts: Vec<Decimal> = strikes_for(options, &bucket, Right::Put);
            if calls.len() != 2 || puts.len() != 2 {
                continue;
            }

            let call_wing = (calls[1] - calls[0]).abs();
            let put_wing = (puts[1] - puts[0]).abs();
            let width = [call_wing, put_wing]
                .into_iter()
                .filter(|w| w.is_positive())
                .min()
                .or_else(|| strike_range(&pick(options, &bucket)));

            mark_used(used, &bucket);
            drafts.push(Draft {
                structure: Structure::IronCondor,
                legs: pick(options, &bucket),
                width,
            });
        }
    }

    fn match_butterflies(&self, options: &[Leg], used: &mut [bool], drafts: &mut Vec<Draft>) {
        for bucket in expiry_buckets(options, used).into_values() {
            if !(3..=4).contains(&bucket.len()) {
                continue;
            }

            let mut qty_by_strike: BTreeMap<Decimal, Decimal> = BTreeMap::new();
            for &i in &bucket {
                if let Some(strike) = options[i].strike {
                    *qty_by_strike.entry(strike).or_default() += options[i].qty;
                }
            }
            let strikes: Vec<(Decimal, Decimal)> = qty_by_strike.into_iter().collect();
            let [(low, q_low), (mid, q_mid), (high, q_high)] = strikes.as_slice() else {
                continue;
            };

            let range = *high - *low;
            let tolerance = (self.policy.butterfly_tolerance_pct * range)
                .max(self.policy.butterfly_tolerance_floor);
            if !(*mid - *low).within(*high - *mid, tolerance) {
                continue;
            }

            let wings_agree = !q_low.is_zero() && q_low.is_positive() == q_high.is_positive();
            let body_opposes = !q_mid.is_zero() && q_mid.is_positive() != q_low.is_positive();
            if !wings_agree || !body_opposes {
                continue;
            }

            mark_used(used, &bucket);
            drafts.push(Draft {
                structure: Structure::Butterfly,
                legs: pick(options, &bucket),
                width: Some(range / Decimal::from_i64(2)),
            });
        }
    }
}

/// (expiry, right, strike) for a classifiable option leg.
fn attrs(leg: &Leg) -> Option<(NaiveDate, Right, Decimal)> {
    Some((leg.expiry?, leg.right?, leg.strike?))
}

fn expiry_buckets(options: &[Leg], used: &[bool]) -> BTreeMap<NaiveDate, Vec<usize>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, leg) in options.iter().enumerate() {
        if used[i] {
            continue;
        }
        if let Some((expiry, _, _)) = attrs(leg) {
            buckets.entry(expiry).or_default().push(i);
        }
    }
    buckets
}

fn strikes_for(options: &[Leg], idx: &[usize], right: Right) -> Vec<Decimal> {
    let mut strikes: Vec<Decimal> = idx
        .iter()
        .map(|&i| &options[i])
        .filter(|l| l.right == Some(right))
        .filter_map(|l| l.strike)
        .collect();
    strikes.sort();
    strikes
}

fn pick(options: &[Leg], idx: &[usize]) -> Vec<Leg> {
    idx.iter().map(|&i| options[i].clone()).collect()
}

fn mark_used(used: &mut [bool], idx: &[usize]) {
    for &i in idx {
        used[i] = true;
    }
}

fn strike_range(legs: &[Leg]) -> Option<Decimal> {
    let strikes: Vec<Decimal> = legs.iter().filter_map(|l| l.strike).collect();
    let max = strikes.iter().copied().max()?;
    let min = strikes.iter().copied().min()?;
    Some(max - min)
}

/// Same right and expiry, different strikes, equal and opposite quantity.
fn match_verticals(options: &[Leg], used: &mut [bool], drafts: &mut Vec<Draft>) {
    for i in 0..options.len() {
        if used[i] || options[i].qty.is_zero() {
            continue;
        }
        let Some((expiry, right, strike)) = attrs(&options[i]) else {
            continue;
        };
        let partner = (i + 1..options.len()).find(|&j| {
            !used[j]
                && options[j].qty == -options[i].qty
                && attrs(&options[j])
                    .map(|(e, r, k)| e == expiry && r == right && k != strike)
                    .unwrap_or(false)
        });
        if let Some(j) = partner {
            let width = options[j].strike.map(|k| (k - strike).abs());
            mark_used(used, &[i, j]);
            drafts.push(Draft {
                structure: Structure::vertical(right),
                legs: pick(options, &[i, j]),
                width,
            });
        }
    }
}

/// Call/put pairs on one expiry with equal same-signed quantity. With `same_strike` this
/// finds straddles, otherwise strangles.
fn match_straddles(options: &[Leg], used: &mut [bool], drafts: &mut Vec<Draft>, same_strike: bool) {
    for i in 0..options.len() {
        if used[i] || options[i].qty.is_zero() {
            continue;
        }
        let Some((expiry, Right::Call, strike)) = attrs(&options[i]) else {
            continue;
        };
        let partner = (0..options.len()).find(|&j| {
            !used[j]
                && options[j].qty == options[i].qty
                && attrs(&options[j])
                    .map(|(e, r, k)| {
                        e == expiry && r == Right::Put && (k == strike) == same_strike
                    })
                    .unwrap_or(false)
        });
        if let Some(j) = partner {
            let (structure, width) = if same_strike {
                (Structure::Straddle, Some(Decimal::zero()))
            } else {
                (
                    Structure::Strangle,
                    options[j].strike.map(|k| (k - strike).abs()),
                )
            };
            let mut idx = [i, j];
            idx.sort_unstable();
            mark_used(used, &idx);
            drafts.push(Draft {
                structure,
                legs: pick(options, &idx),
                width,
            });
        }
    }
}

/// Same right across two expiries with equal and opposite quantity. With `same_strike` this
/// finds calendars (width 0), otherwise diagonals (width = strike distance).
fn match_cross_expiry(
    options: &[Leg],
    used: &mut [bool],
    drafts: &mut Vec<Draft>,
    same_strike: bool,
) {
    for i in 0..options.len() {
        if used[i] || options[i].qty.is_zero() {
            continue;
        }
        let Some((expiry, right, strike)) = attrs(&options[i]) else {
            continue;
        };
        let partner = (i + 1..options.len()).find(|&j| {
            !used[j]
                && options[j].qty == -options[i].qty
                && attrs(&options[j])
                    .map(|(e, r, k)| e != expiry && r == right && (k == strike) == same_strike)
                    .unwrap_or(false)
        });
        if let Some(j) = partner {
            let (structure, width) = if same_strike {
                (Structure::Calendar, Some(Decimal::zero()))
            } else {
                (
                    Structure::Diagonal,
                    options[j].strike.map(|k| (k - strike).abs()),
                )
            };
            mark_used(used, &[i, j]);
            drafts.push(Draft {
                structure,
                legs: pick(options, &[i, j]),
                width,
            });
        }
    }
}

/// Stock and other non-option legs join the combo holding a short call (covered call),
/// else the first combo. With no option combo at all they stand alone as Singles.
fn attach_non_options(drafts: &mut Vec<Draft>, others: Vec<Leg>) {
    if others.is_empty() {
        return;
    }
    if drafts.is_empty() {
        drafts.extend(others.into_iter().map(Draft::single));
        return;
    }
    let target = drafts
        .iter()
        .position(|d| {
            d.legs
                .iter()
                .any(|l| l.right == Some(Right::Call) && l.is_short())
        })
        .unwrap_or(0);
    drafts[target].legs.extend(others);
}

fn finalize(underlying: &Underlying, draft: Draft) -> Combo {
    let mut legs = draft.legs;
    sort_legs_deterministic(&mut legs);
    let expiry = legs.iter().filter(|l| l.is_option()).filter_map(|l| l.expiry).min();
    let has_stock_leg = legs.iter().any(|l| !l.is_option());

    let mut combo = Combo {
        combo_id: String::new(),
        underlying: underlying.clone(),
        expiry,
        structure: draft.structure,
        legs,
        width: draft.width,
        credit_debit: None,
        parent_combo_id: None,
        has_stock_leg,
        created_ms: None,
        closed_ms: None,
    };
    combo.credit_debit = combo.net_premium().and_then(CreditDebit::from_net_premium);
    combo.combo_id = ComboIdentity::of(&combo);
    combo
}

/// Collapse legs sharing an identifier into one leg with the summed quantity.
fn net_by_leg_id(legs: &[Leg]) -> Vec<Leg> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, Leg> = HashMap::new();
    for leg in legs {
        match merged.get_mut(&leg.leg_id) {
            Some(existing) => merge_lot(existing, leg),
            None => {
                order.push(leg.leg_id.clone());
                merged.insert(leg.leg_id.clone(), leg.clone());
            }
        }
    }
    order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect()
}

/// Fold a second lot into `existing`. Cost is quantity-weighted when both lots face the
/// same way; unrealized P&L is only kept when both lots report it.
fn merge_lot(existing: &mut Leg, lot: &Leg) {
    let total = existing.qty + lot.qty;
    let same_side = (existing.qty.is_positive() && lot.qty.is_positive())
        || (existing.qty.is_negative() && lot.qty.is_negative());
    if same_side {
        if let (Some(a), Some(b)) = (existing.avg_cost, lot.avg_cost) {
            existing.avg_cost = (a * existing.qty + b * lot.qty)
                .checked_div(total)
                .or(Some(a));
        }
    }
    existing.unrealized_pnl = match (existing.unrealized_pnl, lot.unrealized_pnl) {
        (Some(a), Some(b)) => Some(a + b),
        _ => None,
    };
    existing.qty = total;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn date(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn jan19() -> NaiveDate {
        date(2024, 1, 19)
    }

    fn opt(right: Right, strike: &str, qty: &str) -> Leg {
        Leg::option("SPY", jan19(), right, d(strike), d(qty))
    }

    fn detector() -> ComboDetector {
        ComboDetector::default()
    }

    fn assert_covers(combos: &[Combo], legs: &[Leg]) {
        let mut seen: Vec<String> = combos.iter().flat_map(|c| c.leg_ids()).collect();
        let mut expected: Vec<String> = legs.iter().map(|l| l.leg_id.clone()).collect();
        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_vertical_call() {
        let legs = vec![opt(Right::Call, "100", "1"), opt(Right::Call, "105", "-1")];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].structure, Structure::VertCall);
        assert_eq!(combos[0].width, Some(d("5")));
        assert_eq!(combos[0].expiry, Some(jan19()));
    }

    #[test]
    fn test_iron_condor_beats_verticals() {
        let legs = vec![
            opt(Right::Put, "95", "-1"),
            opt(Right::Put, "90", "1"),
            opt(Right::Call, "105", "-1"),
            opt(Right::Call, "110", "1"),
        ];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].structure, Structure::IronCondor);
        assert_eq!(combos[0].width, Some(d("5")));
        assert_eq!(combos[0].legs_n(), 4);
    }

    #[test]
    fn test_iron_condor_uneven_wings_takes_min() {
        let legs = vec![
            opt(Right::Put, "95", "-1"),
            opt(Right::Put, "85", "1"),
            opt(Right::Call, "105", "-1"),
            opt(Right::Call, "110", "1"),
        ];
        let combos = detector().detect(&legs);
        assert_eq!(combos[0].structure, Structure::IronCondor);
        assert_eq!(combos[0].width, Some(d("5")));
    }

    #[test]
    fn test_duplicate_lines_net_into_one_combo() {
        let legs = vec![
            opt(Right::Call, "100", "1")
                .with_avg_cost(d("2.00"))
                .with_unrealized_pnl(d("10")),
            opt(Right::Call, "100", "1")
                .with_avg_cost(d("3.00"))
                .with_unrealized_pnl(d("5")),
        ];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].structure, Structure::Single);
        assert_eq!(combos[0].legs.len(), 1);
        assert_eq!(combos[0].legs[0].qty, d("2"));
        assert_eq!(combos[0].legs[0].avg_cost, Some(d("2.5")));
        assert_eq!(combos[0].legs[0].unrealized_pnl, Some(d("15")));

        let ids: HashSet<String> = combos.iter().map(|c| c.combo_id.clone()).collect();
        assert_eq!(ids.len(), combos.len());
    }

    #[test]
    fn test_duplicate_lines_join_a_vertical() {
        let legs = vec![
            opt(Right::Call, "100", "1"),
            opt(Right::Call, "100", "1"),
            opt(Right::Call, "105", "-2"),
        ];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].structure, Structure::VertCall);
        assert_eq!(combos[0].legs_n(), 2);
    }

    #[test]
    fn test_butterfly() {
        let legs = vec![
            opt(Right::Call, "95", "1"),
            opt(Right::Call, "100", "-2"),
            opt(Right::Call, "105", "1"),
        ];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].structure, Structure::Butterfly);
        assert_eq!(combos[0].width, Some(d("5")));
    }

    #[test]
    fn test_asymmetric_three_legs_not_butterfly() {
        let legs = vec![
            opt(Right::Call, "95", "1"),
            opt(Right::Call, "100", "-2"),
            opt(Right::Call, "110", "1"),
        ];
        let combos = detector().detect(&legs);
        assert!(combos.iter().all(|c| c.structure != Structure::Butterfly));
        assert_covers(&combos, &legs);
    }

    #[test]
    fn test_butterfly_tolerance_policy_default() {
        // Policy, not law: 5% of a 10-wide range allows a 0.5 skew.
        let legs = vec![
            opt(Right::Put, "95", "1"),
            opt(Right::Put, "100.25", "-2"),
            opt(Right::Put, "105", "1"),
        ];
        let combos = detector().detect(&legs);
        assert_eq!(combos[0].structure, Structure::Butterfly);

        let strict = ComboDetector::new(DetectorPolicy {
            butterfly_tolerance_pct: Decimal::zero(),
            butterfly_tolerance_floor: d("0.01"),
        });
        let combos = strict.detect(&legs);
        assert!(combos.iter().all(|c| c.structure != Structure::Butterfly));
    }

    #[test]
    fn test_straddle_and_strangle() {
        let straddle = vec![opt(Right::Call, "100", "-1"), opt(Right::Put, "100", "-1")];
        let combos = detector().detect(&straddle);
        assert_eq!(combos[0].structure, Structure::Straddle);
        assert_eq!(combos[0].width, Some(Decimal::zero()));

        let strangle = vec![opt(Right::Call, "110", "2"), opt(Right::Put, "90", "2")];
        let combos = detector().detect(&strangle);
        assert_eq!(combos[0].structure, Structure::Strangle);
        assert_eq!(combos[0].width, Some(d("20")));
    }

    #[test]
    fn test_calendar_and_diagonal() {
        let feb16 = date(2024, 2, 16);
        let calendar = vec![
            opt(Right::Call, "100", "-1"),
            Leg::option("SPY", feb16, Right::Call, d("100"), d("1")),
        ];
        let combos = detector().detect(&calendar);
        assert_eq!(combos[0].structure, Structure::Calendar);
        assert_eq!(combos[0].width, Some(Decimal::zero()));
        assert_eq!(combos[0].expiry, Some(jan19()));

        let diagonal = vec![
            opt(Right::Call, "105", "-1"),
            Leg::option("SPY", feb16, Right::Call, d("100"), d("1")),
        ];
        let combos = detector().detect(&diagonal);
        assert_eq!(combos[0].structure, Structure::Diagonal);
        assert_eq!(combos[0].width, Some(d("5")));
    }

    #[test]
    fn test_unmatched_legs_are_singles() {
        let legs = vec![opt(Right::Call, "100", "1"), opt(Right::Call, "105", "-2")];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 2);
        assert!(combos.iter().all(|c| c.structure == Structure::Single));
        assert!(combos.iter().all(|c| c.width.is_none()));
    }

    #[test]
    fn test_incomplete_option_is_single() {
        let incomplete = Leg::new(
            Underlying::new("SPY"),
            crate::domain::SecType::Option,
            None,
            Some(Right::Call),
            Some(d("100")),
            d("-1"),
            d("100"),
            Some("123".to_string()),
        )
        .unwrap();
        let legs = vec![incomplete, opt(Right::Call, "105", "1")];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 2);
        assert_covers(&combos, &legs);
    }

    #[test]
    fn test_covered_call_keeps_stock_with_short_call() {
        let legs = vec![
            Leg::stock("SPY", d("100")),
            opt(Right::Put, "90", "1"),
            opt(Right::Call, "110", "-1"),
        ];
        let combos = detector().detect(&legs);
        // Long put + short call on the same expiry is neither straddle nor strangle.
        assert_eq!(combos.len(), 2);
        let with_stock: Vec<&Combo> = combos.iter().filter(|c| c.has_stock_leg).collect();
        assert_eq!(with_stock.len(), 1);
        assert!(with_stock[0]
            .legs
            .iter()
            .any(|l| l.right == Some(Right::Call) && l.is_short()));
        assert_covers(&combos, &legs);
    }

    #[test]
    fn test_stock_alone_is_single() {
        let legs = vec![Leg::stock("AAPL", d("50"))];
        let combos = detector().detect(&legs);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].structure, Structure::Single);
        assert!(combos[0].has_stock_leg);
        assert_eq!(combos[0].expiry, None);
    }

    #[test]
    fn test_detection_stable_under_reordering() {
        let legs = vec![
            opt(Right::Call, "100", "1"),
            opt(Right::Call, "105", "-1"),
            opt(Right::Call, "110", "1"),
            opt(Right::Call, "115", "-1"),
            opt(Right::Put, "90", "1"),
            Leg::option("QQQ", jan19(), Right::Put, d("400"), d("-3")),
        ];
        let mut reversed = legs.clone();
        reversed.reverse();

        let a: HashSet<String> = detector().detect(&legs).into_iter().map(|c| c.combo_id).collect();
        let b: HashSet<String> = detector()
            .detect(&reversed)
            .into_iter()
            .map(|c| c.combo_id)
            .collect();
        assert_eq!(a, b);
        assert_covers(&detector().detect(&legs), &legs);
    }

    #[test]
    fn test_ambiguous_verticals_pair_by_strike_order() {
        let legs = vec![
            opt(Right::Call, "110", "-1"),
            opt(Right::Call, "100", "1"),
            opt(Right::Call, "105", "-1"),
        ];
        let combos = detector().detect(&legs);
        let vertical = combos
            .iter()
            .find(|c| c.structure == Structure::VertCall)
            .unwrap();
        assert_eq!(vertical.strikes(), vec![d("100"), d("105")]);
        assert_covers(&combos, &legs);
    }

    #[test]
    fn test_credit_debit_from_costs() {
        let legs = vec![
            opt(Right::Put, "95", "-1").with_avg_cost(d("2.00")),
            opt(Right::Put, "90", "1").with_avg_cost(d("0.80")),
        ];
        let combos = detector().detect(&legs);
        assert_eq!(combos[0].structure, Structure::VertPut);
        assert_eq!(combos[0].credit_debit, Some(CreditDebit::Credit));
    }

    #[test]
    fn test_classify_group() {
        let det = detector();
        let vertical = vec![opt(Right::Call, "100", "1"), opt(Right::Call, "105", "-1")];
        assert_eq!(
            det.classify_group(&vertical),
            Classification {
                structure: Structure::VertCall,
                width: Some(d("5"))
            }
        );

        let single = vec![opt(Right::Call, "100", "1")];
        assert_eq!(det.classify_group(&single).structure, Structure::Single);

        let mixed = vec![opt(Right::Call, "100", "1"), opt(Right::Put, "80", "-3")];
        let c = det.classify_group(&mixed);
        assert_eq!(c.structure, Structure::Synthetic);
        assert_eq!(c.width, Some(d("20")));

        // Two fills on the same contract net into one leg.
        let twice = vec![opt(Right::Call, "100", "1"), opt(Right::Call, "100", "1")];
        assert_eq!(det.classify_group(&twice).structure, Structure::Single);

        assert_eq!(det.classify_group(&[]).structure, Structure::Synthetic);
    }
}
