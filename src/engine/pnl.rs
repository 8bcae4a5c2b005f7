//! Realized P&L attribution for executions, clusters and combos.

use crate::domain::{Combo, Decimal, ExecutionRecord};
use crate::engine::clusterer::Cluster;
use serde::Serialize;
use std::collections::BTreeSet;

/// Cash effect of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegPnl {
    pub exec_key: String,
    /// Sell +, Buy -: price × qty × multiplier.
    pub gross: Decimal,
    pub commission: Option<Decimal>,
    /// Gross minus |commission| (equal to gross when no commission is reported).
    pub net: Decimal,
}

/// Gross and (when any fee is known) net sums over a set of executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PnlTotals {
    pub gross: Decimal,
    pub net: Option<Decimal>,
}

/// Realized P&L joined onto a combo through shared order identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComboPnl {
    pub combo_id: String,
    pub order_ids: Vec<i64>,
    pub cluster_ids: Vec<String>,
    pub pnl: Decimal,
    pub pnl_net: Option<Decimal>,
    pub basis: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
}

pub struct PnlAttributor;

impl PnlAttributor {
    pub fn leg(exec: &ExecutionRecord) -> LegPnl {
        let sign = Decimal::from_i64(exec.side.cash_sign() as i64);
        let gross = sign * exec.price * exec.qty * exec.multiplier;
        let net = match exec.commission {
            Some(c) => gross - c.abs(),
            None => gross,
        };
        LegPnl {
            exec_key: exec.exec_key(),
            gross,
            commission: exec.commission,
            net,
        }
    }

    pub fn totals<'a>(executions: impl IntoIterator<Item = &'a ExecutionRecord>) -> PnlTotals {
        let mut totals = PnlTotals::default();
        let mut fees = Decimal::zero();
        let mut any_fee = false;
        for exec in executions {
            let leg = Self::leg(exec);
            totals.gross += leg.gross;
            if let Some(c) = leg.commission {
                fees += c.abs();
                any_fee = true;
            }
        }
        totals.net = any_fee.then(|| totals.gross - fees);
        totals
    }

    /// Order identifiers of executions that touched any of the combo's legs.
    pub fn combo_order_ids(combo: &Combo, executions: &[ExecutionRecord]) -> BTreeSet<i64> {
        executions
            .iter()
            .filter(|e| combo.touches(e))
            .flat_map(|e| e.order_identifiers())
            .collect()
    }

    /// Sum clusters whose order identifiers intersect the combo's.
    ///
    /// The percentage uses the combo's net debit/credit basis, falling back to
    /// width × multiplier × min |leg qty|; None when neither is available.
    pub fn combo(combo: &Combo, clusters: &[Cluster], executions: &[ExecutionRecord]) -> ComboPnl {
        let order_ids = Self::combo_order_ids(combo, executions);

        let mut cluster_ids = Vec::new();
        let mut pnl = Decimal::zero();
        let mut net_sum = Decimal::zero();
        let mut any_net = false;
        for cluster in clusters {
            if !cluster.order_ids().iter().any(|id| order_ids.contains(id)) {
                continue;
            }
            cluster_ids.push(cluster.cluster_id.clone());
            pnl += cluster.pnl;
            match cluster.pnl_net {
                Some(net) => {
                    net_sum += net;
                    any_net = true;
                }
                None => net_sum += cluster.pnl,
            }
        }

        let basis = combo.pnl_basis();
        let pnl_pct = basis
            .filter(|_| !cluster_ids.is_empty())
            .and_then(|b| pnl.checked_div(b))
            .map(|r| (r * Decimal::hundred()).round_dp(2));

        ComboPnl {
            combo_id: combo.combo_id.clone(),
            order_ids: order_ids.into_iter().collect(),
            cluster_ids,
            pnl,
            pnl_net: any_net.then_some(net_sum),
            basis,
            pnl_pct,
        }
    }
}
