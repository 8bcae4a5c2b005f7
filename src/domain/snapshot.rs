//! Position snapshots used as the "before" baseline for intent classification.

use crate::domain::{Leg, TimeMs};
use serde::{Deserialize, Serialize};

/// A collection of legs observed at one instant. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub taken_ms: TimeMs,
    pub legs: Vec<Leg>,
}

impl PositionSnapshot {
    pub fn new(taken_ms: TimeMs, legs: Vec<Leg>) -> Self {
        Self { taken_ms, legs }
    }

    /// True when no leg holds a non-zero quantity.
    pub fn is_flat(&self) -> bool {
        self.legs.iter().all(|l| l.qty.is_zero())
    }
}
