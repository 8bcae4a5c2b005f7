//! Leg type: one option or stock position line.

use crate::domain::{Decimal, Right, SecType, Underlying};
use crate::error::RowError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Decimal places used when a strike takes part in an identity hash.
pub const IDENTITY_STRIKE_DP: u32 = 2;

/// One option/stock position line.
///
/// `qty` is signed: positive = long, negative = short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    /// Broker-derived (`con:`) or synthesized (`syn:`) identifier.
    pub leg_id: String,
    pub underlying: Underlying,
    pub sec_type: SecType,
    pub expiry: Option<NaiveDate>,
    pub right: Option<Right>,
    pub strike: Option<Decimal>,
    pub qty: Decimal,
    pub multiplier: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_id: Option<String>,
    /// Per-unit cost (premium per share for options).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_cost: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<Decimal>,
}

impl Leg {
    /// Build a leg, resolving its identifier.
    ///
    /// # Errors
    /// Returns `RowError::UnresolvableIdentity` when there is no broker id and the
    /// attributes are insufficient to synthesize one.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        underlying: Underlying,
        sec_type: SecType,
        expiry: Option<NaiveDate>,
        right: Option<Right>,
        strike: Option<Decimal>,
        qty: Decimal,
        multiplier: Decimal,
        broker_id: Option<String>,
    ) -> Result<Self, RowError> {
        let broker_id = normalize_broker_id(broker_id);
        let leg_id = compute_leg_id(
            &underlying,
            sec_type,
            expiry,
            right,
            strike,
            broker_id.as_deref(),
        )
        .ok_or(RowError::UnresolvableIdentity)?;

        Ok(Leg {
            leg_id,
            underlying,
            sec_type,
            expiry,
            right,
            strike,
            qty,
            multiplier,
            broker_id,
            avg_cost: None,
            market_price: None,
            unrealized_pnl: None,
        })
    }

    /// Option leg with synthesized identity and the default multiplier.
    pub fn option(
        underlying: &str,
        expiry: NaiveDate,
        right: Right,
        strike: Decimal,
        qty: Decimal,
    ) -> Self {
        let underlying = Underlying::new(underlying);
        let leg_id = synthetic_leg_id(
            &underlying,
            SecType::Option,
            Some(expiry),
            Some(right),
            Some(strike),
        );
        Leg {
            leg_id,
            underlying,
            sec_type: SecType::Option,
            expiry: Some(expiry),
            right: Some(right),
            strike: Some(strike),
            qty,
            multiplier: Decimal::from_i64(SecType::Option.default_multiplier()),
            broker_id: None,
            avg_cost: None,
            market_price: None,
            unrealized_pnl: None,
        }
    }

    /// Stock leg with synthesized identity.
    pub fn stock(underlying: &str, qty: Decimal) -> Self {
        let underlying = Underlying::new(underlying);
        let leg_id = synthetic_leg_id(&underlying, SecType::Stock, None, None, None);
        Leg {
            leg_id,
            underlying,
            sec_type: SecType::Stock,
            expiry: None,
            right: None,
            strike: None,
            qty,
            multiplier: Decimal::one(),
            broker_id: None,
            avg_cost: None,
            market_price: None,
            unrealized_pnl: None,
        }
    }

    /// Replace the identifier with a broker-assigned one.
    pub fn with_broker_id(mut self, broker_id: impl Into<String>) -> Self {
        if let Some(id) = normalize_broker_id(Some(broker_id.into())) {
            self.leg_id = format!("con:{}", id);
            self.broker_id = Some(id);
        }
        self
    }

    pub fn with_avg_cost(mut self, avg_cost: Decimal) -> Self {
        self.avg_cost = Some(avg_cost);
        self
    }

    pub fn with_unrealized_pnl(mut self, unrealized_pnl: Decimal) -> Self {
        self.unrealized_pnl = Some(unrealized_pnl);
        self
    }

    pub fn with_multiplier(mut self, multiplier: Decimal) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn is_option(&self) -> bool {
        self.sec_type.is_option()
    }

    pub fn is_short(&self) -> bool {
        self.qty.is_negative()
    }

    /// An option leg carrying expiry, right and strike; only these take part in
    /// structure detection.
    pub fn is_classifiable_option(&self) -> bool {
        self.is_option() && self.expiry.is_some() && self.right.is_some() && self.strike.is_some()
    }

    /// Instrument key with the strike rounded to `strike_dp` places.
    ///
    /// None for option legs missing expiry, right or strike (incomplete key).
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
}

/// Attribute identity of an instrument, independent of broker ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub underlying: Underlying,
    pub sec_type: SecType,
    pub expiry: Option<NaiveDate>,
    pub right: Option<Right>,
    pub strike: Option<Decimal>,
}

impl InstrumentKey {
    pub fn build(
        underlying: &Underlying,
        sec_type: SecType,
        expiry: Option<NaiveDate>,
        right: Option<Right>,
        strike: Option<Decimal>,
        strike_dp: u32,
    ) -> Option<Self> {
        if sec_type.is_option() && (expiry.is_none() || right.is_none() || strike.is_none()) {
            return None;
        }
        Some(InstrumentKey {
            underlying: underlying.clone(),
            sec_type,
            expiry,
            right,
            strike: strike.map(|s| s.round_dp(strike_dp)),
        })
    }
}

fn normalize_broker_id(broker_id: Option<String>) -> Option<String> {
    broker_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "0")
}

/// Resolve a leg identifier.
///
/// Priority: broker id (`con:<id>`) > synthetic hash of (underlying, sec type, expiry,
/// right, strike). Returns None when neither is possible.
pub fn compute_leg_id(
    underlying: &Underlying,
    sec_type: SecType,
    expiry: Option<NaiveDate>,
    right: Option<Right>,
    strike: Option<Decimal>,
    broker_id: Option<&str>,
) -> Option<String> {
    if let Some(id) = broker_id.map(str::trim).filter(|s| !s.is_empty() && *s != "0") {
        return Some(format!("con:{}", id));
    }
    if underlying.as_str().is_empty() {
        return None;
    }
    if sec_type.is_option() && (expiry.is_none() || right.is_none() || strike.is_none()) {
        return None;
    }
    Some(synthetic_leg_id(underlying, sec_type, expiry, right, strike))
}

/// Deterministic identifier for a leg without a broker id.
///
/// Identical attributes always synthesize to the same value; the strike is rounded to
/// `IDENTITY_STRIKE_DP` so `100` and `100.00` collide as intended.
pub fn synthetic_leg_id(
    underlying: &Underlying,
    sec_type: SecType,
    expiry: Option<NaiveDate>,
    right: Option<Right>,
    strike: Option<Decimal>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(underlying.as_str());
    hasher.update(b"|");
    hasher.update(sec_type.as_str());
    hasher.update(b"|");
    if let Some(expiry) = expiry {
        hasher.update(expiry.format("%Y-%m-%d").to_string());
    }
    hasher.update(b"|");
    if let Some(right) = right {
        hasher.update(right.as_str());
    }
    hasher.update(b"|");
    if let Some(strike) = strike {
        hasher.update(strike.round_dp(IDENTITY_STRIKE_DP).to_canonical_string());
    }
    let hash = hasher.finalize();
    format!("syn:{}", hex::encode(&hash[..16]))
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

    #[test]
    fn test_synthetic_id_deterministic() {
        let a = Leg::option("SPY", jan19(), Right::Call, d("100"), d("1"));
        let b = Leg::option("spy", jan19(), Right::Call, d("100.00"), d("-3"));
        assert_eq!(a.leg_id, b.leg_id);
        assert!(a.leg_id.starts_with("syn:"));
        assert_eq!(a.leg_id.len(), 4 + 32);
    }

    #[test]
    fn test_synthetic_id_differs_by_attributes() {
        let call = Leg::option("SPY", jan19(), Right::Call, d("100"), d("1"));
        let put = Leg::option("SPY", jan19(), Right::Put, d("100"), d("1"));
        let other_strike = Leg::option("SPY", jan19(), Right::Call, d("105"), d("1"));
        assert_ne!(call.leg_id, put.leg_id);
        assert_ne!(call.leg_id, other_strike.leg_id);
    }

    #[test]
    fn test_broker_id_takes_priority() {
        let leg = Leg::new(
            Underlying::new("SPY"),
            SecType::Option,
            Some(jan19()),
            Some(Right::Call),
            Some(d("100")),
            d("1"),
            d("100"),
            Some("12345".to_string()),
        )
        .unwrap();
        assert_eq!(leg.leg_id, "con:12345");
    }

    #[test]
    fn test_zero_broker_id_is_ignored() {
        let leg = Leg::option("SPY", jan19(), Right::Call, d("100"), d("1")).with_broker_id("0");
        assert!(leg.leg_id.starts_with("syn:"));
        assert_eq!(leg.broker_id, None);
    }

    #[test]
    fn test_unresolvable_identity() {
        let result = Leg::new(
            Underlying::new("SPY"),
            SecType::Option,
            Some(jan19()),
            None,
            Some(d("100")),
            d("1"),
            d("100"),
            None,
        );
        assert!(matches!(result, Err(RowError::UnresolvableIdentity)));
    }

    #[test]
    fn test_option_with_broker_id_but_no_strike_is_resolvable() {
        let leg = Leg::new(
            Underlying::new("SPY"),
            SecType::Option,
            None,
            None,
            None,
            d("1"),
            d("100"),
            Some("777".to_string()),
        )
        .unwrap();
        assert_eq!(leg.leg_id, "con:777");
        assert!(!leg.is_classifiable_option());
        assert_eq!(leg.instrument_key(2), None);
    }

    #[test]
    fn test_instrument_key_rounds_strike() {
        let leg = Leg::option("SPY", jan19(), Right::Put, d("99.999"), d("-1"));
        let key = leg.instrument_key(2).unwrap();
        assert_eq!(key.strike, Some(d("100")));
    }

    #[test]
    fn test_stock_leg_key_complete() {
        let leg = Leg::stock("AAPL", d("100"));
        assert!(leg.instrument_key(2).is_some());
        assert!(!leg.is_option());
        assert_eq!(leg.multiplier, d("1"));
    }
}
