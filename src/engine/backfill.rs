//! Lazy inference of structure metadata and roll lineage for stored combos.
//!
//! Records written by older versions, or by callers that had no fresh leg data, may lack a
//! structure label, width, credit/debit sign or parent link. The backfill rebuilds those from
//! the stored legs and only ever fills fields that are still null.

use crate::db::Repository;
use crate::domain::combo::net_premium;
use crate::domain::{ComboRecord, CreditDebit, Decimal, Right, SecType, Structure, TimeMs};
use crate::engine::detector::ComboDetector;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Windows for roll-lineage search, in days between expiries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineagePolicy {
    /// Any earlier combo on the underlying qualifies within this gap.
    pub max_gap_days: i64,
    /// An earlier combo with the same leg shape qualifies within this wider gap.
    pub max_shape_gap_days: i64,
}

impl Default for LineagePolicy {
    fn default() -> Self {
        Self {
            max_gap_days: 14,
            max_shape_gap_days: 63,
        }
    }
}

/// Values inferred for one record. `None` means nothing could be inferred for that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillPatch {
    pub combo_id: String,
    pub expiry: Option<NaiveDate>,
    pub structure: Option<Structure>,
    pub combo_type: Option<Structure>,
    pub width: Option<Decimal>,
    pub credit_debit: Option<CreditDebit>,
    pub parent_combo_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub patched: usize,
    pub linked: usize,
    pub failed: usize,
}

/// Leg layout ignoring expiry and strike: what stays the same across a roll.
type LegShape = Vec<(SecType, Option<Right>, Decimal)>;

pub struct StructureBackfill {
    detector: ComboDetector,
    lineage: LineagePolicy,
}

impl StructureBackfill {
    pub fn new(detector: ComboDetector, lineage: LineagePolicy) -> Self {
        Self { detector, lineage }
    }

    /// Infer missing metadata for `record` from its own legs and from `candidates`.
    pub fn infer(&self, record: &ComboRecord, candidates: &[ComboRecord]) -> BackfillPatch {
        let legs = record.to_legs();

        let classification = if record.structure.is_none()
            || record.combo_type.is_none()
            || record.width.is_none()
        {
            Some(self.detector.classify_group(&legs))
        } else {
            None
        };

        let expiry = record_expiry(record);

        let credit_debit = net_premium(legs.iter().map(|l| (l.qty, l.avg_cost, l.multiplier)))
            .and_then(CreditDebit::from_net_premium);

        let parent_combo_id = if record.parent_combo_id.is_none() {
            self.find_parent(record, expiry, candidates)
        } else {
            None
        };

        BackfillPatch {
            combo_id: record.combo_id.clone(),
            expiry,
            structure: classification.map(|c| c.structure),
            combo_type: classification.map(|c| c.structure),
            width: classification.and_then(|c| c.width),
            credit_debit,
            parent_combo_id,
        }
    }

    /// Closest earlier-expiry combo on the same underlying.
    ///
    /// Same-shape candidates within the wide window are preferred over any-structure
    /// candidates within the narrow one; within a tier the smallest gap wins, then the
    /// lowest combo id.
    pub fn find_parent(
        &self,
        record: &ComboRecord,
        expiry: Option<NaiveDate>,
        candidates: &[ComboRecord],
    ) -> Option<String> {
        let expiry = expiry?;
        let shape = leg_shape(record);

        let mut same_shape: Option<(i64, &str)> = None;
        let mut any_shape: Option<(i64, &str)> = None;

        for candidate in candidates {
            if candidate.combo_id == record.combo_id
                || candidate.underlying != record.underlying
                || candidate.parent_combo_id.as_deref() == Some(record.combo_id.as_str())
            {
                continue;
            }
            let Some(parent_expiry) = record_expiry(candidate) else {
                continue;
            };
            if parent_expiry >= expiry {
                continue;
            }
            if let (Some(parent_created), Some(created)) = (candidate.created_ms, record.created_ms)
            {
                if parent_created > created {
                    continue;
                }
            }

            let gap = (expiry - parent_expiry).num_days();
            let key = (gap, candidate.combo_id.as_str());
            if gap <= self.lineage.max_shape_gap_days && leg_shape(candidate) == shape {
                same_shape = Some(same_shape.map_or(key, |best| best.min(key)));
            }
            if gap <= self.lineage.max_gap_days {
                any_shape = Some(any_shape.map_or(key, |best| best.min(key)));
            }
        }

        same_shape.or(any_shape).map(|(_, id)| id.to_string())
    }

    /// Backfill every pending record in the store.
    ///
    /// Records that fail to persist are logged and skipped; they stay pending and are
    /// retried on the next run.
    pub async fn run(&self, repo: &Repository, now: TimeMs) -> Result<BackfillReport, sqlx::Error> {
        let pending = repo.load_pending_backfill().await?;
        let mut report = BackfillReport {
            scanned: pending.len(),
            ..BackfillReport::default()
        };
        if pending.is_empty() {
            debug!("No combos pending backfill");
            return Ok(report);
        }

        let candidates = repo.load_combos(false).await?;
        for record in &pending {
            let patch = self.infer(record, &candidates);
            match repo.apply_backfill(&patch, now).await {
                Ok(false) => {
                    debug!(combo_id = %record.combo_id, "Already backfilled by another run");
                }
                Ok(true) => {
                    report.patched += 1;
                    if record.parent_combo_id.is_none() && patch.parent_combo_id.is_some() {
                        report.linked += 1;
                    }
                }
                Err(e) => {
                    warn!(combo_id = %record.combo_id, error = %e, "Backfill failed; skipping");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            patched = report.patched,
            linked = report.linked,
            failed = report.failed,
            "Structure backfill complete"
        );
        Ok(report)
    }
}

/// Stored expiry, else the earliest option expiry among the stored legs.
fn record_expiry(record: &ComboRecord) -> Option<NaiveDate> {
    record.expiry.or_else(|| {
        record
            .legs
            .iter()
            .filter(|l| l.sec_type.is_option())
            .filter_map(|l| l.expiry)
            .min()
    })
}

fn leg_shape(record: &ComboRecord) -> LegShape {
    let mut shape: LegShape = record
        .legs
        .iter()
        .map(|l| (l.sec_type, l.right, l.qty.unwrap_or_else(Decimal::one)))
        .collect();
    shape.sort();
    shape
}
