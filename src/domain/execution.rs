//! ExecutionRecord: a single fill, possibly a multi-leg combo order.

use crate::domain::leg::{compute_leg_id, InstrumentKey};
use crate::domain::{Decimal, Leg, OpenClose, Right, SecType, Side, TimeMs, Underlying};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One leg definition embedded in a combo (BAG) order execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboLegDef {
    #[serde(default)]
    pub broker_id: Option<String>,
    #[serde(default = "default_leg_sec_type")]
    pub sec_type: SecType,
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    #[serde(default)]
    pub right: Option<Right>,
    #[serde(default)]
    pub strike: Option<Decimal>,
    #[serde(default = "default_ratio")]
    pub ratio: i64,
    /// Leg action relative to the parent order (Buy = same direction as the parent).
    pub side: Side,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub multiplier: Option<Decimal>,
}

fn default_leg_sec_type() -> SecType {
    SecType::Option
}

fn default_ratio() -> i64 {
    1
}

/// A single trade execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Broker execution id, when supplied.
    pub exec_id: Option<String>,
    pub time_ms: TimeMs,
    pub underlying: Underlying,
    pub sec_type: SecType,
    pub side: Side,
    /// Unsigned quantity.
    pub qty: Decimal,
    pub price: Decimal,
    pub commission: Option<Decimal>,
    pub multiplier: Decimal,
    pub order_id: Option<i64>,
    pub perm_id: Option<i64>,
    pub expiry: Option<NaiveDate>,
    pub right: Option<Right>,
    pub strike: Option<Decimal>,
    pub broker_id: Option<String>,
    /// Free-form order reference tag (may carry a roll marker).
    pub order_ref: Option<String>,
    pub open_close: Option<OpenClose>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combo_legs: Vec<ComboLegDef>,
    /// Key of the combo execution this row was expanded from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    /// Rank among executions of one batch that would otherwise share a key.
    #[serde(default, skip_serializing_if = "is_first")]
    pub occurrence: u32,
}

fn is_first(occurrence: &u32) -> bool {
    *occurrence == 0
}

impl ExecutionRecord {
    /// Create an execution with the required attributes; optional ones via `with_*`.
    pub fn new(
        time_ms: TimeMs,
        underlying: Underlying,
        sec_type: SecType,
        side: Side,
        qty: Decimal,
        price: Decimal,
    ) -> Self {
        ExecutionRecord {
            exec_id: None,
            time_ms,
            underlying,
            sec_type,
            side,
            qty: qty.abs(),
            price,
            commission: None,
            multiplier: Decimal::from_i64(sec_type.default_multiplier()),
            order_id: None,
            perm_id: None,
            expiry: None,
            right: None,
            strike: None,
            broker_id: None,
            order_ref: None,
            open_close: None,
            combo_legs: Vec::new(),
            parent_key: None,
            occurrence: 0,
        }
    }

    pub fn with_option(mut self, expiry: NaiveDate, right: Right, strike: Decimal) -> Self {
        self.expiry = Some(expiry);
        self.right = Some(right);
        self.strike = Some(strike);
        self
    }

    pub fn with_exec_id(mut self, exec_id: impl Into<String>) -> Self {
        self.exec_id = Some(exec_id.into());
        self
    }

    pub fn with_order_ids(mut self, order_id: Option<i64>, perm_id: Option<i64>) -> Self {
        self.order_id = order_id;
        self.perm_id = perm_id;
        self
    }

    pub fn with_commission(mut self, commission: Decimal) -> Self {
        self.commission = Some(commission);
        self
    }

    pub fn with_multiplier(mut self, multiplier: Decimal) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_broker_id(mut self, broker_id: impl Into<String>) -> Self {
        self.broker_id = Some(broker_id.into());
        self
    }

    pub fn with_order_ref(mut self, order_ref: impl Into<String>) -> Self {
        self.order_ref = Some(order_ref.into());
        self
    }

    pub fn with_open_close(mut self, open_close: OpenClose) -> Self {
        self.open_close = Some(open_close);
        self
    }

    pub fn with_combo_legs(mut self, legs: Vec<ComboLegDef>) -> Self {
        self.combo_legs = legs;
        self
    }

    /// Stable unique key for this execution.
    ///
    /// Priority: broker `exec_id` > hash of deterministic fields. A non-zero occurrence is
    /// appended so repeated fills within a batch keep distinct keys.
    pub fn exec_key(&self) -> String {
        let base = self.base_key();
        if self.occurrence == 0 {
            base
        } else {
            format!("{}~{}", base, self.occurrence)
        }
    }

    /// Key without the occurrence suffix.
    pub fn base_key(&self) -> String {
        if let Some(id) = self.exec_id.as_deref().filter(|s| !s.trim().is_empty()) {
            return format!("exec:{}", id.trim());
        }

        let mut hasher = Sha256::new();
        hasher.update(self.underlying.as_str());
        hasher.update(self.time_ms.as_ms().to_le_bytes());
        hasher.update(if self.side == Side::Buy { b"B" } else { b"S" });
        hasher.update(self.qty.to_canonical_string());
        hasher.update(self.price.to_canonical_string());
        if let Some(expiry) = self.expiry {
            hasher.update(expiry.format("%Y%m%d").to_string());
        }
        if let Some(right) = self.right {
            hasher.update(right.as_str());
        }
        if let Some(strike) = self.strike {
            hasher.update(strike.to_canonical_string());
        }
        if let Some(order_id) = self.order_id {
            hasher.update(order_id.to_le_bytes());
        }
        if let Some(perm_id) = self.perm_id {
            hasher.update(perm_id.to_le_bytes());
        }
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }

    /// Non-trivial order identity: perm id preferred, then order id; zero is trivial.
    pub fn order_key(&self) -> Option<i64> {
        self.perm_id
            .filter(|id| *id != 0)
            .or(self.order_id.filter(|id| *id != 0))
    }

    /// Every non-trivial order identifier this execution carries.
    pub fn order_identifiers(&self) -> Vec<i64> {
        [self.perm_id, self.order_id]
            .into_iter()
            .flatten()
            .filter(|id| *id != 0)
            .collect()
    }

    /// Position delta: +qty for Buy, -qty for Sell.
    pub fn signed_qty(&self) -> Decimal {
        if self.side == Side::Buy {
            self.qty
        } else {
            -self.qty
        }
    }

    pub fn has_option_attributes(&self) -> bool {
        self.expiry.is_some() || self.right.is_some() || self.strike.is_some()
    }

    /// A combo order: no option attributes of its own but embedded leg definitions.
    pub fn is_combo_order(&self) -> bool {
        !self.has_option_attributes() && !self.combo_legs.is_empty()
    }

    /// Identifier of the leg this execution trades, same scheme as [`Leg::leg_id`].
    pub fn leg_id(&self) -> Option<String> {
        compute_leg_id(
            &self.underlying,
            self.sec_type,
            self.expiry,
            self.right,
            self.strike,
            self.broker_id.as_deref(),
        )
    }

    pub fn instrument_key(&self, strike_dp: u32) -> Option<InstrumentKey> {
        InstrumentKey::build(
            &self.underlying,
            self.sec_type,
            self.expiry,
            self.right,
            self.strike,
            strike_dp,
        )
    }

    /// View this execution as a position leg (signed by side), for structure detection.
    pub fn to_leg(&self) -> Option<Leg> {
        let leg_id = self.leg_id()?;
        Some(Leg {
            leg_id,
            underlying: self.underlying.clone(),
            sec_type: self.sec_type,
            expiry: self.expiry,
            right: self.right,
            strike: self.strike,
            qty: self.signed_qty(),
            multiplier: self.multiplier,
            broker_id: self.broker_id.clone(),
            avg_cost: Some(self.price),
            market_price: None,
            unrealized_pnl: None,
        })
    }

    /// Expand a combo order into one synthetic execution per embedded leg.
    ///
    /// Leg quantity is the parent quantity times the leg ratio, the side is the parent
    /// side composed with the leg action, commission is split by ratio share and the
    /// price comes from the leg definition (zero when the broker reports only a net price).
    /// Non-combo executions are returned unchanged.
    pub fn expand_legs(self) -> Vec<ExecutionRecord> {
        if !self.is_combo_order() {
            return vec![self];
        }

        let parent_key = self.exec_key();
        let id_base = self
            .exec_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(parent_key.as_str())
            .to_string();
        let total_ratio: i64 = self.combo_legs.iter().map(|l| l.ratio.abs().max(1)).sum();

        self.combo_legs
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let ratio = Decimal::from_i64(def.ratio.abs().max(1));
                let side = match def.side {
                    Side::Buy => self.side,
                    Side::Sell => self.side.opposite(),
                };
                let commission = self
                    .commission
                    .map(|c| c * ratio / Decimal::from_i64(total_ratio));
                let multiplier = def
                    .multiplier
                    .unwrap_or_else(|| Decimal::from_i64(def.sec_type.default_multiplier()));

                ExecutionRecord {
                    exec_id: Some(format!("{}#{}", id_base, i)),
                    time_ms: self.time_ms,
                    underlying: self.underlying.clone(),
                    sec_type: def.sec_type,
                    side,
                    qty: self.qty * ratio,
                    price: def.price.unwrap_or_default(),
                    commission,
                    multiplier,
                    order_id: self.order_id,
                    perm_id: self.perm_id,
                    expiry: def.expiry,
                    right: def.right,
                    strike: def.strike,
                    broker_id: def.broker_id.clone(),
                    order_ref: self.order_ref.clone(),
                    open_close: self.open_close,
                    combo_legs: Vec::new(),
                    parent_key: Some(parent_key.clone()),
                    occurrence: 0,
                }
            })
            .collect()
    }
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

    fn exec(side: Side, qty: &str, price: &str) -> ExecutionRecord {
        ExecutionRecord::new(
            TimeMs::new(1_000),
            Underlying::new("SPY"),
            SecType::Option,
            side,
            d(qty),
            d(price),
        )
        .with_option(jan19(), Right::Call, d("100"))
    }

    #[test]
    fn test_exec_key_prefers_exec_id() {
        let e = exec(Side::Buy, "1", "2.5").with_exec_id("0001f4e8.65a1");
        assert_eq!(e.exec_key(), "exec:0001f4e8.65a1");
    }

    #[test]
    fn test_exec_key_hash_deterministic() {
        let a = exec(Side::Buy, "1", "2.5");
        let b = exec(Side::Buy, "1", "2.5");
        let c = exec(Side::Sell, "1", "2.5");
        assert!(a.exec_key().starts_with("hash:"));
        assert_eq!(a.exec_key(), b.exec_key());
        assert_ne!(a.exec_key(), c.exec_key());
    }

    #[test]
    fn test_order_key_skips_zero() {
        let e = exec(Side::Buy, "1", "1").with_order_ids(Some(55), Some(0));
        assert_eq!(e.order_key(), Some(55));
        let e = exec(Side::Buy, "1", "1").with_order_ids(Some(0), None);
        assert_eq!(e.order_key(), None);
        let e = exec(Side::Buy, "1", "1").with_order_ids(Some(55), Some(9001));
        assert_eq!(e.order_key(), Some(9001));
        assert_eq!(e.order_identifiers(), vec![9001, 55]);
    }

    #[test]
    fn test_exec_key_occurrence_suffix() {
        let first = exec(Side::Buy, "1", "2.5");
        let mut second = first.clone();
        second.occurrence = 1;
        assert_ne!(first.exec_key(), second.exec_key());
        assert_eq!(second.exec_key(), format!("{}~1", first.exec_key()));

        let mut tagged = first.with_exec_id("0001f4e8.65a1");
        tagged.occurrence = 2;
        assert_eq!(tagged.exec_key(), "exec:0001f4e8.65a1~2");
    }

    #[test]
    fn test_signed_qty_and_leg_view() {
        let e = exec(Side::Sell, "2", "1.25");
        assert_eq!(e.signed_qty(), d("-2"));
        let leg = e.to_leg().unwrap();
        assert_eq!(leg.qty, d("-2"));
        assert_eq!(
            leg.leg_id,
            Leg::option("SPY", jan19(), Right::Call, d("100"), d("1")).leg_id
        );
    }

    #[test]
    fn test_expand_combo_order() {
        let parent = ExecutionRecord::new(
            TimeMs::new(5_000),
            Underlying::new("SPY"),
            SecType::Option,
            Side::Buy,
            d("2"),
            d("1.10"),
        )
        .with_exec_id("bag-1")
        .with_commission(d("4"))
        .with_order_ids(Some(7), Some(70))
        .with_combo_legs(vec![
            ComboLegDef {
                broker_id: None,
                sec_type: SecType::Option,
                expiry: Some(jan19()),
                right: Some(Right::Call),
                strike: Some(d("100")),
                ratio: 1,
                side: Side::Buy,
                price: Some(d("3.00")),
                multiplier: None,
            },
            ComboLegDef {
                broker_id: None,
                sec_type: SecType::Option,
                expiry: Some(jan19()),
                right: Some(Right::Call),
                strike: Some(d("105")),
                ratio: 1,
                side: Side::Sell,
                price: None,
                multiplier: None,
            },
        ]);
        assert!(parent.is_combo_order());

        let legs = parent.expand_legs();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].side, Side::Buy);
        assert_eq!(legs[1].side, Side::Sell);
        assert_eq!(legs[0].qty, d("2"));
        assert_eq!(legs[0].commission, Some(d("2")));
        assert_eq!(legs[1].commission, Some(d("2")));
        assert_eq!(legs[0].price, d("3"));
        assert_eq!(legs[1].price, Decimal::zero());
        assert_eq!(legs[0].exec_key(), "exec:bag-1#0");
        assert_eq!(legs[1].parent_key.as_deref(), Some("exec:bag-1"));
        assert_eq!(legs[1].perm_id, Some(70));
        assert!(!legs[1].is_combo_order());
    }

    #[test]
    fn test_expand_non_combo_is_identity() {
        let e = exec(Side::Buy, "1", "1");
        let out = e.clone().expand_legs();
        assert_eq!(out, vec![e]);
    }
}
