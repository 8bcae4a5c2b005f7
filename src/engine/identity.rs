//! Stable combo identity.

use crate::domain::{Combo, Structure, Underlying};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Content-hash identity over a combo's leg set.
///
/// Leg order never matters: identifiers are sorted (and de-duplicated) before hashing, so
/// re-detecting the same legs on a later run yields the same id.
pub struct ComboIdentity;

impl ComboIdentity {
    pub fn compute(
        underlying: &Underlying,
        expiry: Option<NaiveDate>,
        structure: Structure,
        leg_ids: &[String],
    ) -> String {
        let mut ids: Vec<&str> = leg_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut hasher = Sha256::new();
        hasher.update(underlying.as_str());
        hasher.update(b"|");
        if let Some(expiry) = expiry {
            hasher.update(expiry.format("%Y-%m-%d").to_string());
        }
        hasher.update(b"|");
        hasher.update(structure.as_str());
        hasher.update(b"|");
        hasher.update(ids.join(","));
        let hash = hasher.finalize();
        format!("combo:{}", hex::encode(&hash[..16]))
    }

    pub fn of(combo: &Combo) -> String {
        Self::compute(
            &combo.underlying,
            combo.expiry,
            combo.structure,
            &combo.leg_ids(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_is_order_independent() {
        let spy = Underlying::new("SPY");
        let expiry = NaiveDate::from_ymd_opt(2024, 1, 19);
        let a = ComboIdentity::compute(&spy, expiry, Structure::VertCall, &ids(&["con:1", "con:2"]));
        let b = ComboIdentity::compute(&spy, expiry, Structure::VertCall, &ids(&["con:2", "con:1"]));
        assert_eq!(a, b);
        assert!(a.starts_with("combo:"));
        assert_eq!(a.len(), "combo:".len() + 32);
    }

    #[test]
    fn test_identity_depends_on_context() {
        let spy = Underlying::new("SPY");
        let jan = NaiveDate::from_ymd_opt(2024, 1, 19);
        let feb = NaiveDate::from_ymd_opt(2024, 2, 16);
        let legs = ids(&["con:1", "con:2"]);
        let base = ComboIdentity::compute(&spy, jan, Structure::VertCall, &legs);
        assert_ne!(base, ComboIdentity::compute(&spy, feb, Structure::VertCall, &legs));
        assert_ne!(base, ComboIdentity::compute(&spy, jan, Structure::Strangle, &legs));
        assert_ne!(
            base,
            ComboIdentity::compute(&Underlying::new("QQQ"), jan, Structure::VertCall, &legs)
        );
    }
}
