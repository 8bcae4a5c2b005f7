//! Grouping executions into fill clusters (one trading decision each).

use crate::domain::{
    sort_executions_deterministic, Decimal, ExecutionRecord, Side, Structure, TimeMs, Underlying,
};
use crate::engine::detector::ComboDetector;
use crate::engine::pnl::PnlAttributor;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPolicy {
    /// Largest gap between consecutive same-(underlying, side) executions in one cluster.
    pub window_ms: i64,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self { window_ms: 60_000 }
    }
}

/// How a cluster's members were grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBasis {
    OrderId,
    TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub underlying: Underlying,
    pub start_ms: TimeMs,
    pub end_ms: TimeMs,
    pub structure: Structure,
    pub basis: ClusterBasis,
    /// Gross cash P&L: Σ cash sign × price × qty × multiplier.
    pub pnl: Decimal,
    /// Gross minus fees; None when no member reports a commission.
    pub pnl_net: Option<Decimal>,
    pub legs_n: usize,
    pub perm_ids: Vec<i64>,
    pub order_ids: Vec<i64>,
    pub exec_keys: Vec<String>,
    #[serde(skip)]
    pub members: Vec<ExecutionRecord>,
}

impl Cluster {
    /// Every non-trivial perm/order identifier seen in the cluster.
    pub fn order_ids(&self) -> BTreeSet<i64> {
        self.perm_ids
            .iter()
            .chain(self.order_ids.iter())
            .copied()
            .collect()
    }
}

pub struct ExecutionClusterer {
    policy: ClusterPolicy,
    detector: ComboDetector,
}

impl ExecutionClusterer {
    pub fn new(policy: ClusterPolicy, detector: ComboDetector) -> Self {
        Self { policy, detector }
    }

    /// Expand combo orders into per-leg executions, sort deterministically and number
    /// repeats of the same key so every prepared execution has a distinct `exec_key`.
    pub fn prepare(executions: &[ExecutionRecord]) -> Vec<ExecutionRecord> {
        let mut expanded: Vec<ExecutionRecord> = executions
            .iter()
            .cloned()
            .flat_map(ExecutionRecord::expand_legs)
            .collect();
        sort_executions_deterministic(&mut expanded);

        let mut seen: HashMap<String, u32> = HashMap::new();
        for exec in expanded.iter_mut() {
            let count = seen.entry(exec.base_key()).or_insert(0);
            exec.occurrence = *count;
            *count += 1;
        }
        expanded
    }

    /// Two-pass clustering: shared order identity first, then a sliding time window per
    /// (underlying, side). Combo orders are expanded before either pass.
    pub fn cluster(&self, executions: &[ExecutionRecord]) -> Vec<Cluster> {
        let executions = Self::prepare(executions);

        let mut by_order: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, exec) in executions.iter().enumerate() {
            if let Some(key) = exec.order_key() {
                by_order.entry(key).or_default().push(i);
            }
        }

        let mut assigned = vec![false; executions.len()];
        let mut clusters = Vec::new();
        for members in by_order.into_values().filter(|m| m.len() >= 2) {
            for &i in &members {
                assigned[i] = true;
            }
            clusters.push(self.build(&executions, &members, ClusterBasis::OrderId));
        }

        // Executions are time-ordered, so each bucket is too.
        let mut by_bucket: BTreeMap<(Underlying, Side), Vec<usize>> = BTreeMap::new();
        for (i, exec) in executions.iter().enumerate() {
            if !assigned[i] {
                by_bucket
                    .entry((exec.underlying.clone(), exec.side))
                    .or_default()
                    .push(i);
            }
        }

        for members in by_bucket.into_values() {
            let mut current: Vec<usize> = Vec::new();
            for i in members {
                if let Some(&last) = current.last() {
                    let gap = executions[i].time_ms.as_ms() - executions[last].time_ms.as_ms();
                    if gap > self.policy.window_ms {
                        clusters.push(self.build(&executions, &current, ClusterBasis::TimeWindow));
                        current.clear();
                    }
                }
                current.push(i);
            }
            if !current.is_empty() {
                clusters.push(self.build(&executions, &current, ClusterBasis::TimeWindow));
            }
        }

        clusters.sort_by(|a, b| (a.start_ms, &a.cluster_id).cmp(&(b.start_ms, &b.cluster_id)));
        clusters
    }

    fn build(&self, executions: &[ExecutionRecord], idx: &[usize], basis: ClusterBasis) -> Cluster {
        let members: Vec<ExecutionRecord> = idx.iter().map(|&i| executions[i].clone()).collect();
        let exec_keys: Vec<String> = members.iter().map(|e| e.exec_key()).collect();

        let mut sorted_keys = exec_keys.clone();
        sorted_keys.sort();
        let mut hasher = Sha256::new();
        hasher.update(sorted_keys.join(","));
        let hash = hasher.finalize();
        let cluster_id = format!("cl:{}", hex::encode(&hash[..16]));

        let legs: Vec<_> = members.iter().filter_map(|e| e.to_leg()).collect();
        let structure = self.detector.classify_group(&legs).structure;
        let legs_n = members
            .iter()
            .map(|e| e.leg_id().unwrap_or_else(|| e.exec_key()))
            .collect::<BTreeSet<_>>()
            .len();

        let totals = PnlAttributor::totals(members.iter());
        let perm_ids: BTreeSet<i64> = members
            .iter()
            .filter_map(|e| e.perm_id)
            .filter(|id| *id != 0)
            .collect();
        let order_ids: BTreeSet<i64> = members
            .iter()
            .filter_map(|e| e.order_id)
            .filter(|id| *id != 0)
            .collect();

        let start_ms = members.iter().map(|e| e.time_ms).min().unwrap_or(TimeMs::new(0));
        let end_ms = members.iter().map(|e| e.time_ms).max().unwrap_or(TimeMs::new(0));

        Cluster {
            cluster_id,
            underlying: members
                .first()
                .map(|e| e.underlying.clone())
                .unwrap_or_else(|| Underlying::new("")),
            start_ms,
            end_ms,
            structure,
            basis,
            pnl: totals.gross,
            pnl_net: totals.net,
            legs_n,
            perm_ids: perm_ids.into_iter().collect(),
            order_ids: order_ids.into_iter().collect(),
            exec_keys,
            members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComboLegDef, Right, SecType};
    use chrono::NaiveDate;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn jan19() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 19).unwrap()
    }

    fn exec(t: i64, side: Side, right: Right, strike: &str, price: &str) -> ExecutionRecord {
        ExecutionRecord::new(
            TimeMs::new(t),
            Underlying::new("SPY"),
            SecType::Option,
            side,
            d("1"),
            d(price),
        )
        .with_option(jan19(), right, d(strike))
    }

    fn clusterer() -> ExecutionClusterer {
        ExecutionClusterer::new(ClusterPolicy::default(), ComboDetector::default())
    }

    #[test]
    fn test_prepare_numbers_identical_partial_fills() {
        let fill = exec(1_000, Side::Buy, Right::Call, "100", "0.50").with_order_ids(None, Some(10));
        let prepared = ExecutionClusterer::prepare(&[fill.clone(), fill.clone(), fill]);
        let keys: BTreeSet<String> = prepared.iter().map(|e| e.exec_key()).collect();
        assert_eq!(keys.len(), 3);
        let occurrences: Vec<u32> = prepared.iter().map(|e| e.occurrence).collect();
        assert_eq!(occurrences, vec![0, 1, 2]);

        let clusters = clusterer().cluster(&prepared);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].exec_keys.len(), 3);
    }

    #[test]
    fn test_same_perm_id_one_cluster_regardless_of_window() {
        let executions = vec![
            exec(0, Side::Buy, Right::Call, "100", "2.00").with_order_ids(None, Some(77)),
            exec(10_000, Side::Sell, Right::Call, "105", "1.00").with_order_ids(None, Some(77)),
        ];
        let tight = ExecutionClusterer::new(ClusterPolicy { window_ms: 1 }, ComboDetector::default());
        let clusters = tight.cluster(&executions);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].basis, ClusterBasis::OrderId);
        assert_eq!(clusters[0].structure, Structure::VertCall);
        assert_eq!(clusters[0].perm_ids, vec![77]);
        assert_eq!(clusters[0].pnl, d("-100"));
        assert_eq!(clusters[0].legs_n, 2);
        assert_eq!(clusters[0].end_ms, TimeMs::new(10_000));
    }

    #[test]
    fn test_zero_order_id_is_trivial() {
        let executions = vec![
            exec(0, Side::Buy, Right::Call, "100", "2.00").with_order_ids(Some(0), None),
            exec(120_000, Side::Buy, Right::Call, "105", "1.00").with_order_ids(Some(0), None),
        ];
        let clusters = clusterer().cluster(&executions);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.basis == ClusterBasis::TimeWindow));
    }

    #[test]
    fn test_time_window_per_underlying_and_side() {
        let executions = vec![
            exec(0, Side::Buy, Right::Call, "100", "1"),
            exec(30_000, Side::Buy, Right::Put, "100", "1"),
            exec(85_000, Side::Buy, Right::Put, "95", "1"),
            exec(20_000, Side::Sell, Right::Call, "110", "1"),
            exec(200_000, Side::Buy, Right::Call, "120", "1"),
        ];
        let clusters = clusterer().cluster(&executions);
        // buys: 0, 30s, 85s chain (gaps 30s, 55s) then 200s alone; the sell is its own.
        assert_eq!(clusters.len(), 3);
        let first = &clusters[0];
        assert_eq!(first.legs_n, 3);
        assert_eq!(first.start_ms, TimeMs::new(0));
        assert_eq!(first.end_ms, TimeMs::new(85_000));
        assert_eq!(first.structure, Structure::Synthetic);
        assert_eq!(first.pnl_net, None);
    }

    #[test]
    fn test_straddle_cluster_label_and_net() {
        let executions = vec![
            exec(0, Side::Sell, Right::Call, "100", "3").with_commission(d("1")),
            exec(5_000, Side::Sell, Right::Put, "100", "2").with_commission(d("1")),
        ];
        let clusters = clusterer().cluster(&executions);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].structure, Structure::Straddle);
        assert_eq!(clusters[0].pnl, d("500"));
        assert_eq!(clusters[0].pnl_net, Some(d("498")));
    }

    fn put_spread_defs() -> Vec<ComboLegDef> {
        [("95", Side::Buy), ("90", Side::Sell)]
            .into_iter()
            .map(|(strike, side)| ComboLegDef {
                broker_id: None,
                sec_type: SecType::Option,
                expiry: Some(jan19()),
                right: Some(Right::Put),
                strike: Some(d(strike)),
                ratio: 1,
                side,
                price: None,
                multiplier: None,
            })
            .collect()
    }

    fn bag() -> ExecutionRecord {
        ExecutionRecord::new(
            TimeMs::new(0),
            Underlying::new("SPY"),
            SecType::Option,
            Side::Buy,
            d("1"),
            d("1.10"),
        )
        .with_exec_id("bag")
        .with_combo_legs(put_spread_defs())
    }

    #[test]
    fn test_combo_order_expanded_before_clustering() {
        let clusters = clusterer().cluster(&[bag()]);
        // No order ids: the expanded legs trade opposite sides, so the window splits them.
        assert_eq!(clusters.len(), 2);
        assert!(clusters
            .iter()
            .all(|c| c.members[0].parent_key.as_deref() == Some("exec:bag")));

        let clusters = clusterer().cluster(&[bag().with_order_ids(Some(5), Some(500))]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].basis, ClusterBasis::OrderId);
        assert_eq!(clusters[0].structure, Structure::VertPut);
        assert_eq!(clusters[0].perm_ids, vec![500]);
        assert_eq!(clusters[0].order_ids, vec![5]);
    }

    #[test]
    fn test_cluster_id_deterministic() {
        let executions = vec![
            exec(0, Side::Buy, Right::Call, "100", "1"),
            exec(1_000, Side::Buy, Right::Call, "105", "1"),
        ];
        let mut reversed = executions.clone();
        reversed.reverse();
        let a = clusterer().cluster(&executions);
        let b = clusterer().cluster(&reversed);
        assert_eq!(a[0].cluster_id, b[0].cluster_id);
        assert!(a[0].cluster_id.starts_with("cl:"));
    }
}
