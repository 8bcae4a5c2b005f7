use crate::config::Config;
use crate::datasource::PositionSource;
use crate::db::{Repository, UpsertOutcome};
use crate::domain::{ComboRow, PositionSnapshot, TimeMs};
use crate::engine::{
    BackfillReport, ComboDetector, DetectorPolicy, LineagePolicy, PositionNormalizer,
    StructureBackfill,
};
use crate::error::EngineError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Structures view: detect combos in a snapshot and move the store forward to it.
pub struct ComboSync {
    repo: Arc<Repository>,
    detector: ComboDetector,
    backfill: StructureBackfill,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub as_of: TimeMs,
    pub snapshot_id: String,
    /// Rows the normalizer set aside (source-driven runs only).
    pub rejected_rows: usize,
    pub combos: Vec<ComboRow>,
    pub store: UpsertOutcome,
    pub backfill: BackfillReport,
}

impl ComboSync {
    pub fn new(repo: Arc<Repository>, detector: DetectorPolicy, lineage: LineagePolicy) -> Self {
        let detector = ComboDetector::new(detector);
        Self {
            repo,
            backfill: StructureBackfill::new(detector.clone(), lineage),
            detector,
        }
    }

    pub fn from_config(repo: Arc<Repository>, config: &Config) -> Self {
        Self::new(repo, config.detector.clone(), config.lineage.clone())
    }

    /// Detect, persist and backfill for one snapshot. `snapshot.taken_ms` is the run's
    /// as-of time for lifecycle bookkeeping.
    ///
    /// # Errors
    /// Store failures abort the run; the upsert itself is all-or-nothing.
    pub async fn run(&self, snapshot: &PositionSnapshot) -> Result<SyncReport, EngineError> {
        let as_of = snapshot.taken_ms;
        let mut combos = self.detector.detect(&snapshot.legs);
        info!(
            as_of_ms = as_of.as_ms(),
            legs = snapshot.legs.len(),
            combos = combos.len(),
            "Detected combos"
        );

        let store = self.repo.upsert_combos(&combos, as_of).await?;
        let snapshot_id = self.repo.store_snapshot(snapshot).await?;
        let backfill = self.backfill.run(&self.repo, as_of).await?;

        // Lineage is inferred after the upsert; surface it on this run's output.
        let parents: HashMap<String, String> = self
            .repo
            .load_combos(true)
            .await?
            .into_iter()
            .filter_map(|r| r.parent_combo_id.map(|p| (r.combo_id, p)))
            .collect();
        for combo in &mut combos {
            if combo.parent_combo_id.is_none() {
                combo.parent_combo_id = parents.get(&combo.combo_id).cloned();
            }
        }

        Ok(SyncReport {
            as_of,
            snapshot_id,
            rejected_rows: 0,
            combos: combos.iter().map(|c| c.to_row()).collect(),
            store,
            backfill,
        })
    }

    /// Fetch position rows from `source`, normalize them and run as of `as_of`.
    ///
    /// # Errors
    /// A failing source or store aborts the run; unreadable rows do not.
    pub async fn run_from_source(
        &self,
        source: &dyn PositionSource,
        as_of: TimeMs,
    ) -> Result<SyncReport, EngineError> {
        let rows = source.fetch_positions().await?;
        let normalized = PositionNormalizer::normalize_positions(&rows);
        let snapshot = PositionSnapshot::new(as_of, normalized.records);

        let mut report = self.run(&snapshot).await?;
        report.rejected_rows = normalized.rejected.len();
        Ok(report)
    }
}
