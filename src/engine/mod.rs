//! Pure computation engine(s) for combo detection and trade-intent reconciliation.
//!
//! Everything here is deterministic given its inputs. The only component that touches the
//! store is `StructureBackfill::run`, which reads and patches records through `Repository`.

pub mod backfill;
pub mod clusterer;
pub mod detector;
pub mod identity;
pub mod intent;
pub mod normalizer;
pub mod pnl;
pub mod prior;

pub use backfill::{BackfillPatch, BackfillReport, LineagePolicy, StructureBackfill};
pub use clusterer::{Cluster, ClusterBasis, ClusterPolicy, ExecutionClusterer};
pub use detector::{Classification, ComboDetector, DetectorPolicy};
pub use identity::ComboIdentity;
pub use intent::{
    aggregate, ComboIntent, ExecutionIntent, IntentClassifier, IntentMode, IntentOutcome,
    IntentPolicy, IntentWarning, LegIntent,
};
pub use normalizer::{Normalized, PositionNormalizer, RawRow, RejectedRow};
pub use pnl::{ComboPnl, LegPnl, PnlAttributor, PnlTotals};
pub use prior::{PriorBasis, PriorPositionResolver, ResolvedPrior};
