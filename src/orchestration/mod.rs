//! End-to-end passes over the engine and store.
//!
//! - `sync`: positions snapshot -> combos -> store lifecycle -> backfill (structures view)
//! - `reconcile`: executions -> clusters -> intent -> realized P&L (what-just-happened view)

pub mod reconcile;
pub mod sync;

pub use reconcile::{ReconcileReport, Reconciler};
pub use sync::{ComboSync, SyncReport};
