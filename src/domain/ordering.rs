//! Stable orderings for deterministic processing.

use crate::domain::{Decimal, ExecutionRecord, Leg, Right};
use chrono::NaiveDate;

/// Stable ordering key for executions.
///
/// Ordering: time_ms -> perm_id -> order_id -> exec_key -> occurrence
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExecutionOrderingKey {
    pub time_ms: i64,
    pub perm_id: Option<i64>,
    pub order_id: Option<i64>,
    pub exec_key: String,
    pub occurrence: u32,
}

impl ExecutionOrderingKey {
    pub fn from_execution(exec: &ExecutionRecord) -> Self {
        ExecutionOrderingKey {
            time_ms: exec.time_ms.as_ms(),
            perm_id: exec.perm_id,
            order_id: exec.order_id,
            exec_key: exec.base_key(),
            occurrence: exec.occurrence,
        }
    }
}

/// Sort executions deterministically.
pub fn sort_executions_deterministic(executions: &mut [ExecutionRecord]) {
    executions.sort_by_cached_key(ExecutionOrderingKey::from_execution);
}

/// Stable ordering key for legs inside one underlying.
///
/// Ordering: expiry -> right -> strike -> leg_id. Stock legs (no expiry) sort first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LegOrderingKey {
    pub expiry: Option<NaiveDate>,
    pub right: Option<Right>,
    pub strike: Option<Decimal>,
    pub leg_id: String,
}

impl LegOrderingKey {
    pub fn from_leg(leg: &Leg) -> Self {
        LegOrderingKey {
            expiry: leg.expiry,
            right: leg.right,
            strike: leg.strike,
            leg_id: leg.leg_id.clone(),
        }
    }
}

/// Sort legs deterministically.
pub fn sort_legs_deterministic(legs: &mut [Leg]) {
    legs.sort_by_cached_key(LegOrderingKey::from_leg);
}
