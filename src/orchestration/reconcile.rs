use crate::config::Config;
use crate::datasource::PositionSource;
use crate::db::Repository;
use crate::domain::{Combo, ExecutionRecord, PositionSnapshot, TimeMs};
use crate::engine::{
    Cluster, ClusterPolicy, ComboDetector, ComboIntent, ComboPnl, DetectorPolicy,
    ExecutionClusterer, ExecutionIntent, IntentClassifier, IntentPolicy, IntentWarning, LegIntent,
    PnlAttributor, PnlTotals, PositionNormalizer, PriorBasis, PriorPositionResolver,
    ResolvedPrior,
};
use crate::error::EngineError;
use serde::Serialize;
use tracing::info;

/// What-just-happened view: cluster executions, label intent against the prior snapshot
/// and attribute realized P&L.
pub struct Reconciler {
    clusterer: ExecutionClusterer,
    classifier: IntentClassifier,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub prior_basis: Option<PriorBasis>,
    pub prior_taken_ms: Option<TimeMs>,
    pub warnings: Vec<IntentWarning>,
    pub rejected_rows: usize,
    pub executions: Vec<ExecutionIntent>,
    pub legs: Vec<LegIntent>,
    pub clusters: Vec<Cluster>,
    pub combos: Vec<ComboIntent>,
    pub combo_pnl: Vec<ComboPnl>,
    pub totals: PnlTotals,
}

impl Reconciler {
    pub fn new(detector: DetectorPolicy, cluster: ClusterPolicy, intent: IntentPolicy) -> Self {
        Self {
            clusterer: ExecutionClusterer::new(cluster, ComboDetector::new(detector)),
            classifier: IntentClassifier::new(intent),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.detector.clone(),
            config.cluster.clone(),
            config.intent.clone(),
        )
    }

    /// Reconcile against in-memory snapshots. The prior is resolved at the earliest
    /// execution time. Combos are read-only.
    pub fn run(
        &self,
        executions: &[ExecutionRecord],
        snapshots: &[PositionSnapshot],
        combos: &[Combo],
    ) -> ReconcileReport {
        let prepared = ExecutionClusterer::prepare(executions);
        let prior = prepared
            .first()
            .and_then(|e| PriorPositionResolver::resolve(snapshots, e.time_ms));
        self.finish(executions, prepared, prior, combos)
    }

    /// Reconcile using the store's snapshots and (when `combos` is None) every stored combo.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn run_with_store(
        &self,
        repo: &Repository,
        executions: &[ExecutionRecord],
        combos: Option<&[Combo]>,
    ) -> Result<ReconcileReport, EngineError> {
        let prepared = ExecutionClusterer::prepare(executions);
        let prior = match prepared.first() {
            Some(first) => repo.snapshot_before(first.time_ms).await?,
            None => None,
        };
        let stored;
        let combos = match combos {
            Some(c) => c,
            None => {
                stored = repo
                    .load_combos(false)
                    .await?
                    .iter()
                    .map(|r| r.to_combo())
                    .collect::<Vec<_>>();
                stored.as_slice()
            }
        };
        Ok(self.finish(executions, prepared, prior, combos))
    }

    /// Fetch execution rows from `source`, normalize them and reconcile against the store.
    ///
    /// # Errors
    /// A failing source or store aborts the run; unreadable rows do not.
    pub async fn run_from_source(
        &self,
        source: &dyn PositionSource,
        repo: &Repository,
    ) -> Result<ReconcileReport, EngineError> {
        let rows = source.fetch_executions().await?;
        let normalized = PositionNormalizer::normalize_executions(&rows);
        let mut report = self.run_with_store(repo, &normalized.records, None).await?;
        report.rejected_rows = normalized.rejected.len();
        Ok(report)
    }

    fn finish(
        &self,
        executions: &[ExecutionRecord],
        prepared: Vec<ExecutionRecord>,
        prior: Option<ResolvedPrior>,
        combos: &[Combo],
    ) -> ReconcileReport {
        let clusters = self.clusterer.cluster(executions);
        let outcome = self
            .classifier
            .classify(&prepared, prior.as_ref().map(|p| &p.snapshot));
        let labelled = self.classifier.label_executions(&outcome.legs, &clusters);
        let combo_intents = self
            .classifier
            .combo_effects(combos, &prepared, &outcome.legs);
        let combo_pnl = combos
            .iter()
            .map(|c| PnlAttributor::combo(c, &clusters, &prepared))
            .collect();
        let totals = PnlAttributor::totals(&prepared);

        info!(
            executions = prepared.len(),
            clusters = clusters.len(),
            combos = combos.len(),
            baseline = prior.is_some(),
            "Reconciliation complete"
        );

        ReconcileReport {
            prior_basis: prior.as_ref().map(|p| p.basis),
            prior_taken_ms: prior.as_ref().map(|p| p.snapshot.taken_ms),
            warnings: outcome.warnings,
            rejected_rows: 0,
            executions: labelled,
            legs: outcome.legs,
            clusters,
            combos: combo_intents,
            combo_pnl,
            totals,
        }
    }
}
