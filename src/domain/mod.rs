//! Domain types for the combo ledger.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Primitives: TimeMs, Underlying, Side, Right, SecType
//! - Legs with broker or synthesized identifiers
//! - Executions (including combo-order expansion) and position snapshots
//! - Combo structures and their persisted projection
//! - Intent labels and matching tiers

pub mod combo;
pub mod decimal;
pub mod execution;
pub mod intent;
pub mod leg;
pub mod ordering;
pub mod primitives;
pub mod snapshot;

pub use combo::{Combo, ComboRecord, ComboRow, CreditDebit, LegRecord, Structure};
pub use decimal::Decimal;
pub use execution::{ComboLegDef, ExecutionRecord};
pub use intent::{MatchTier, OpenClose, PositionEffect};
pub use leg::{InstrumentKey, Leg};
pub use ordering::{sort_executions_deterministic, sort_legs_deterministic};
pub use primitives::{Right, SecType, Side, TimeMs, Underlying};
pub use snapshot::PositionSnapshot;
