//! Locating the "before" position snapshot for intent classification.

use crate::domain::{PositionSnapshot, TimeMs};
use serde::Serialize;
use tracing::warn;

/// How confidently the chosen snapshot precedes the reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorBasis {
    /// Taken strictly before the reference time.
    Strict,
    /// Nothing precedes the reference; the latest available snapshot stands in.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrior {
    pub snapshot: PositionSnapshot,
    pub basis: PriorBasis,
}

pub struct PriorPositionResolver;

impl PriorPositionResolver {
    /// Latest snapshot with `taken_ms < reference`, else the latest available, else None.
    pub fn resolve(snapshots: &[PositionSnapshot], reference: TimeMs) -> Option<ResolvedPrior> {
        if let Some(snapshot) = snapshots
            .iter()
            .filter(|s| s.taken_ms < reference)
            .max_by_key(|s| s.taken_ms)
        {
            return Some(ResolvedPrior {
                snapshot: snapshot.clone(),
                basis: PriorBasis::Strict,
            });
        }

        let latest = snapshots.iter().max_by_key(|s| s.taken_ms)?;
        warn!(
            reference_ms = reference.as_ms(),
            snapshot_ms = latest.taken_ms.as_ms(),
            "No snapshot strictly precedes the reference; using latest available"
        );
        Some(ResolvedPrior {
            snapshot: latest.clone(),
            basis: PriorBasis::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ms: i64) -> PositionSnapshot {
        PositionSnapshot::new(TimeMs::new(ms), Vec::new())
    }

    #[test]
    fn test_strictly_older_wins() {
        let snaps = vec![snap(100), snap(300), snap(200), snap(500)];
        let resolved = PriorPositionResolver::resolve(&snaps, TimeMs::new(300)).unwrap();
        assert_eq!(resolved.snapshot.taken_ms, TimeMs::new(200));
        assert_eq!(resolved.basis, PriorBasis::Strict);
    }

    #[test]
    fn test_falls_back_to_latest() {
        let snaps = vec![snap(400), snap(500)];
        let resolved = PriorPositionResolver::resolve(&snaps, TimeMs::new(300)).unwrap();
        assert_eq!(resolved.snapshot.taken_ms, TimeMs::new(500));
        assert_eq!(resolved.basis, PriorBasis::Fallback);
    }

    #[test]
    fn test_none_without_snapshots() {
        assert!(PriorPositionResolver::resolve(&[], TimeMs::new(1)).is_none());
    }
}
