//! Combo types: detected structures and their persisted projection.

use crate::domain::leg::IDENTITY_STRIKE_DP;
use crate::domain::{Decimal, ExecutionRecord, Leg, Right, SecType, TimeMs, Underlying};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognized multi-leg structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Structure {
    Single,
    VertCall,
    VertPut,
    Straddle,
    Strangle,
    IronCondor,
    Butterfly,
    Calendar,
    Diagonal,
    /// Several legs that match no named pattern as a whole.
    #[serde(rename = "synthetic")]
    Synthetic,
}

impl Structure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Structure::Single => "Single",
            Structure::VertCall => "VertCall",
            Structure::VertPut => "VertPut",
            Structure::Straddle => "Straddle",
            Structure::Strangle => "Strangle",
            Structure::IronCondor => "IronCondor",
            Structure::Butterfly => "Butterfly",
            Structure::Calendar => "Calendar",
            Structure::Diagonal => "Diagonal",
            Structure::Synthetic => "synthetic",
        }
    }

    /// Vertical spread on the given right.
    pub fn vertical(right: Right) -> Structure {
        match right {
            Right::Call => Structure::VertCall,
            Right::Put => Structure::VertPut,
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Structure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Structure::Single),
            "vertcall" => Ok(Structure::VertCall),
            "vertput" => Ok(Structure::VertPut),
            "straddle" => Ok(Structure::Straddle),
            "strangle" => Ok(Structure::Strangle),
            "ironcondor" | "iron_condor" => Ok(Structure::IronCondor),
            "butterfly" => Ok(Structure::Butterfly),
            "calendar" => Ok(Structure::Calendar),
            "diagonal" => Ok(Structure::Diagonal),
            "synthetic" => Ok(Structure::Synthetic),
            other => Err(format!("unknown structure: {}", other)),
        }
    }
}

/// Whether opening the combo received (credit) or paid (debit) net premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditDebit {
    Credit,
    Debit,
}

impl CreditDebit {
    /// Credit for a positive net premium, Debit for negative, None when flat.
    pub fn from_net_premium(net: Decimal) -> Option<CreditDebit> {
        if net.is_positive() {
            Some(CreditDebit::Credit)
        } else if net.is_negative() {
            Some(CreditDebit::Debit)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditDebit::Credit => "credit",
            CreditDebit::Debit => "debit",
        }
    }
}

impl FromStr for CreditDebit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(CreditDebit::Credit),
            "debit" => Ok(CreditDebit::Debit),
            other => Err(format!("unknown credit/debit: {}", other)),
        }
    }
}

/// A detected combo: one or more legs on the same underlying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub combo_id: String,
    pub underlying: Underlying,
    /// Earliest option expiry among the legs.
    pub expiry: Option<NaiveDate>,
    pub structure: Structure,
    pub legs: Vec<Leg>,
    pub width: Option<Decimal>,
    pub credit_debit: Option<CreditDebit>,
    pub parent_combo_id: Option<String>,
    pub has_stock_leg: bool,
    pub created_ms: Option<TimeMs>,
    pub closed_ms: Option<TimeMs>,
}

impl Combo {
    /// Leg identifiers in sorted order.
    pub fn leg_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.legs.iter().map(|l| l.leg_id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn legs_n(&self) -> usize {
        self.legs.len()
    }

    /// True when the execution trades one of this combo's legs, by identifier or, failing
    /// that, by instrument attributes (an execution may lack the broker id a position row
    /// carries).
    pub fn touches(&self, exec: &ExecutionRecord) -> bool {
        if exec.underlying != self.underlying {
            return false;
        }
        let exec_leg_id = exec.leg_id();
        let exec_key = exec.instrument_key(IDENTITY_STRIKE_DP);
        self.legs.iter().any(|l| {
            exec_leg_id.as_deref() == Some(l.leg_id.as_str())
                || (exec_key.is_some() && l.instrument_key(IDENTITY_STRIKE_DP) == exec_key)
        })
    }

    pub fn strikes(&self) -> Vec<Decimal> {
        sorted_strikes(self.legs.iter().filter_map(|l| l.strike))
    }

    pub fn call_strikes(&self) -> Vec<Decimal> {
        sorted_strikes(
            self.legs
                .iter()
                .filter(|l| l.right == Some(Right::Call))
                .filter_map(|l| l.strike),
        )
    }

    pub fn put_strikes(&self) -> Vec<Decimal> {
        sorted_strikes(
            self.legs
                .iter()
                .filter(|l| l.right == Some(Right::Put))
                .filter_map(|l| l.strike),
        )
    }

    pub fn call_count(&self) -> usize {
        self.legs
            .iter()
            .filter(|l| l.right == Some(Right::Call))
            .count()
    }

    pub fn put_count(&self) -> usize {
        self.legs
            .iter()
            .filter(|l| l.right == Some(Right::Put))
            .count()
    }

    /// Σ leg unrealized pnl; None when no leg reports one.
    pub fn unrealized_pnl(&self) -> Option<Decimal> {
        let values: Vec<Decimal> = self.legs.iter().filter_map(|l| l.unrealized_pnl).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.into_iter().sum())
        }
    }

    /// Net premium at entry: Σ(-qty × avg_cost × multiplier). Positive = credit received.
    ///
    /// None when no leg carries a cost.
    pub fn net_premium(&self) -> Option<Decimal> {
        net_premium(
            self.legs
                .iter()
                .map(|l| (l.qty, l.avg_cost, l.multiplier)),
        )
    }

    pub fn min_abs_qty(&self) -> Option<Decimal> {
        self.legs
            .iter()
            .filter(|l| l.sec_type == SecType::Option)
            .map(|l| l.qty.abs())
            .min()
    }

    pub fn option_multiplier(&self) -> Decimal {
        self.legs
            .iter()
            .find(|l| l.is_option())
            .map(|l| l.multiplier)
            .unwrap_or_else(|| Decimal::from_i64(SecType::Option.default_multiplier()))
    }

    /// Denominator for percentage P&L: |net premium| when known and non-zero, else
    /// width × multiplier × min |leg qty|.
    pub fn pnl_basis(&self) -> Option<Decimal> {
        if let Some(net) = self.net_premium().filter(|n| !n.is_zero()) {
            return Some(net.abs());
        }
        let width = self.width.filter(|w| w.is_positive())?;
        let qty = self.min_abs_qty().filter(|q| q.is_positive())?;
        Some(width * self.option_multiplier() * qty)
    }

    /// Output projection with every derived column filled in.
    pub fn to_row(&self) -> ComboRow {
        let unrealized_pnl = self.unrealized_pnl();
        let unrealized_pnl_pct = match (unrealized_pnl, self.pnl_basis()) {
            (Some(pnl), Some(basis)) => pnl
                .checked_div(basis)
                .map(|r| (r * Decimal::hundred()).round_dp(2)),
            _ => None,
        };
        ComboRow {
            combo_id: self.combo_id.clone(),
            underlying: self.underlying.clone(),
            expiry: self.expiry,
            structure: self.structure,
            combo_type: self.structure,
            legs: self.leg_ids(),
            legs_n: self.legs_n(),
            width: self.width,
            credit_debit: self.credit_debit,
            parent_combo_id: self.parent_combo_id.clone(),
            closed_ms: self.closed_ms,
            strikes: self.strikes(),
            call_strikes: self.call_strikes(),
            put_strikes: self.put_strikes(),
            call_count: self.call_count(),
            put_count: self.put_count(),
            has_stock_leg: self.has_stock_leg,
            unrealized_pnl,
            unrealized_pnl_pct,
        }
    }
}

/// Flat output row for a combo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboRow {
    pub combo_id: String,
    pub underlying: Underlying,
    pub expiry: Option<NaiveDate>,
    pub structure: Structure,
    #[serde(rename = "type")]
    pub combo_type: Structure,
    pub legs: Vec<String>,
    pub legs_n: usize,
    pub width: Option<Decimal>,
    pub credit_debit: Option<CreditDebit>,
    pub parent_combo_id: Option<String>,
    #[serde(rename = "closed_date")]
    pub closed_ms: Option<TimeMs>,
    pub strikes: Vec<Decimal>,
    pub call_strikes: Vec<Decimal>,
    pub put_strikes: Vec<Decimal>,
    pub call_count: usize,
    pub put_count: usize,
    pub has_stock_leg: bool,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_pnl_pct: Option<Decimal>,
}

/// Leg row as stored alongside a combo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegRecord {
    pub leg_id: String,
    pub sec_type: SecType,
    pub expiry: Option<NaiveDate>,
    pub right: Option<Right>,
    pub strike: Option<Decimal>,
    pub qty: Option<Decimal>,
    pub multiplier: Option<Decimal>,
    pub avg_cost: Option<Decimal>,
}

impl LegRecord {
    pub fn from_leg(leg: &Leg) -> Self {
        LegRecord {
            leg_id: leg.leg_id.clone(),
            sec_type: leg.sec_type,
            expiry: leg.expiry,
            right: leg.right,
            strike: leg.strike,
            qty: Some(leg.qty),
            multiplier: Some(leg.multiplier),
            avg_cost: leg.avg_cost,
        }
    }

    /// Rebuild a leg for re-classification. Legacy rows without a quantity are
    /// treated as one long contract.
    pub fn to_leg(&self, underlying: &Underlying) -> Leg {
        Leg {
            leg_id: self.leg_id.clone(),
            underlying: underlying.clone(),
            sec_type: self.sec_type,
            expiry: self.expiry,
            right: self.right,
            strike: self.strike,
            qty: self.qty.unwrap_or_else(Decimal::one),
            multiplier: self
                .multiplier
                .unwrap_or_else(|| Decimal::from_i64(self.sec_type.default_multiplier())),
            broker_id: None,
            avg_cost: self.avg_cost,
            market_price: None,
            unrealized_pnl: None,
        }
    }
}

/// Durable projection of a combo, possibly carrying lazily-inferred metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboRecord {
    pub combo_id: String,
    pub underlying: Underlying,
    pub expiry: Option<NaiveDate>,
    pub structure: Option<Structure>,
    pub combo_type: Option<Structure>,
    pub width: Option<Decimal>,
    pub credit_debit: Option<CreditDebit>,
    pub parent_combo_id: Option<String>,
    pub has_stock_leg: bool,
    pub created_ms: Option<TimeMs>,
    pub last_seen_ms: Option<TimeMs>,
    pub closed_ms: Option<TimeMs>,
    pub backfilled_ms: Option<TimeMs>,
    pub legs: Vec<LegRecord>,
}

impl ComboRecord {
    pub fn is_active(&self) -> bool {
        self.closed_ms.is_none()
    }

    /// Leg identifiers in sorted order.
    pub fn leg_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.legs.iter().map(|l| l.leg_id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn to_legs(&self) -> Vec<Leg> {
        self.legs.iter().map(|l| l.to_leg(&self.underlying)).collect()
    }

    /// Rebuild a combo view (read-only consumers such as reconciliation).
    pub fn to_combo(&self) -> Combo {
        Combo {
            combo_id: self.combo_id.clone(),
            underlying: self.underlying.clone(),
            expiry: self.expiry,
            structure: self
                .combo_type
                .or(self.structure)
                .unwrap_or(Structure::Synthetic),
            legs: self.to_legs(),
            width: self.width,
            credit_debit: self.credit_debit,
            parent_combo_id: self.parent_combo_id.clone(),
            has_stock_leg: self.has_stock_leg,
            created_ms: self.created_ms,
            closed_ms: self.closed_ms,
        }
    }
}

/// Σ(-qty × cost × multiplier) over legs that carry a cost; None if none do.
pub fn net_premium(legs: impl Iterator<Item = (Decimal, Option<Decimal>, Decimal)>) -> Option<Decimal> {
    let mut total = Decimal::zero();
    let mut any = false;
    for (qty, cost, multiplier) in legs {
        if let Some(cost) = cost {
            total += -qty * cost * multiplier;
            any = true;
        }
    }
    any.then_some(total)
}

fn sorted_strikes(strikes: impl Iterator<Item = Decimal>) -> Vec<Decimal> {
    let mut out: Vec<Decimal> = strikes.collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn jan19() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 19).unwrap()
    }

    fn condor() -> Combo {
        let legs = vec![
            Leg::option("SPY", jan19(), Right::Put, d("90"), d("1")).with_avg_cost(d("0.50")),
            Leg::option("SPY", jan19(), Right::Put, d("95"), d("-1")).with_avg_cost(d("1.20")),
            Leg::option("SPY", jan19(), Right::Call, d("105"), d("-1")).with_avg_cost(d("1.10")),
            Leg::option("SPY", jan19(), Right::Call, d("110"), d("1")).with_avg_cost(d("0.40")),
        ];
        Combo {
            combo_id: "combo:test".to_string(),
            underlying: Underlying::new("SPY"),
            expiry: Some(jan19()),
            structure: Structure::IronCondor,
            legs,
            width: Some(d("5")),
            credit_debit: None,
            parent_combo_id: None,
            has_stock_leg: false,
            created_ms: None,
            closed_ms: None,
        }
    }

    #[test]
    fn test_structure_labels_parse_back() {
        for s in [
            Structure::Single,
            Structure::VertCall,
            Structure::VertPut,
            Structure::Straddle,
            Structure::Strangle,
            Structure::IronCondor,
            Structure::Butterfly,
            Structure::Calendar,
            Structure::Diagonal,
            Structure::Synthetic,
        ] {
            assert_eq!(s.as_str().parse::<Structure>().unwrap(), s);
        }
    }

    #[test]
    fn test_combo_derived_columns() {
        let combo = condor();
        assert_eq!(combo.legs_n(), 4);
        assert_eq!(combo.call_count(), 2);
        assert_eq!(combo.put_count(), 2);
        assert_eq!(combo.strikes(), vec![d("90"), d("95"), d("105"), d("110")]);
        assert_eq!(combo.call_strikes(), vec![d("105"), d("110")]);
        assert_eq!(combo.put_strikes(), vec![d("90"), d("95")]);
        assert_eq!(combo.leg_ids().len(), 4);
    }

    #[test]
    fn test_net_premium_credit() {
        // -(1*0.5) + 1.2 + 1.1 - 0.4 = 1.4 per share, x100
        let combo = condor();
        assert_eq!(combo.net_premium(), Some(d("140")));
        assert_eq!(
            CreditDebit::from_net_premium(d("140")),
            Some(CreditDebit::Credit)
        );
        assert_eq!(combo.pnl_basis(), Some(d("140")));
    }

    #[test]
    fn test_pnl_basis_falls_back_to_width() {
        let mut combo = condor();
        for leg in &mut combo.legs {
            leg.avg_cost = None;
        }
        assert_eq!(combo.net_premium(), None);
        assert_eq!(combo.pnl_basis(), Some(d("500")));
    }

    #[test]
    fn test_unrealized_pct() {
        let mut combo = condor();
        combo.legs[0].unrealized_pnl = Some(d("35"));
        let row = combo.to_row();
        assert_eq!(row.unrealized_pnl, Some(d("35")));
        assert_eq!(row.unrealized_pnl_pct, Some(d("25")));
    }

    #[test]
    fn test_touches_by_attributes() {
        use crate::domain::Side;
        let combo = condor();
        let exec = ExecutionRecord::new(
            TimeMs::new(0),
            Underlying::new("SPY"),
            SecType::Option,
            Side::Buy,
            d("1"),
            d("1"),
        )
        .with_option(jan19(), Right::Call, d("105.00"))
        .with_broker_id("999");
        assert!(combo.touches(&exec));

        let other = exec.clone().with_option(jan19(), Right::Call, d("106"));
        assert!(!combo.touches(&other));
    }

    #[test]
    fn test_leg_record_roundtrip_to_leg() {
        let leg = Leg::option("SPY", jan19(), Right::Call, d("100"), d("-2"));
        let record = LegRecord::from_leg(&leg);
        let rebuilt = record.to_leg(&Underlying::new("SPY"));
        assert_eq!(rebuilt.leg_id, leg.leg_id);
        assert_eq!(rebuilt.qty, d("-2"));
    }
}
