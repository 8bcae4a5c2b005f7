//! Trade-intent labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Effect of an execution (or an aggregate of executions) on existing positions.
///
/// Leg-level labels are Open, Close or Roll (explicit hint only); Mixed and Unknown
/// only arise when aggregating to a cluster or combo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionEffect {
    Open,
    Close,
    Roll,
    Mixed,
    Unknown,
}

impl PositionEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionEffect::Open => "Open",
            PositionEffect::Close => "Close",
            PositionEffect::Roll => "Roll",
            PositionEffect::Mixed => "Mixed",
            PositionEffect::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PositionEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(PositionEffect::Open),
            "close" => Ok(PositionEffect::Close),
            "roll" => Ok(PositionEffect::Roll),
            "mixed" => Ok(PositionEffect::Mixed),
            "unknown" => Ok(PositionEffect::Unknown),
            other => Err(format!("unknown position effect: {}", other)),
        }
    }
}

/// Broker-supplied open/close flag on an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenClose {
    Open,
    Close,
}

impl OpenClose {
    /// Parse "O"/"C"/"open"/"close"; anything else (including IB's "?") is None.
    pub fn parse(s: &str) -> Option<OpenClose> {
        match s.trim().to_ascii_lowercase().as_str() {
            "o" | "open" | "opening" => Some(OpenClose::Open),
            "c" | "close" | "closing" => Some(OpenClose::Close),
            _ => None,
        }
    }
}

impl From<OpenClose> for PositionEffect {
    fn from(value: OpenClose) -> Self {
        match value {
            OpenClose::Open => PositionEffect::Open,
            OpenClose::Close => PositionEffect::Close,
        }
    }
}

/// Which rung of the matching ladder decided a leg's label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Roll marker or explicit open/close flag on the execution.
    Hint,
    /// Leg identifier found in the prior snapshot.
    IdMatch,
    /// Same underlying/expiry/right, strike equal after rounding.
    AttrExact,
    /// Same underlying/expiry/right, strike within tolerance.
    AttrTolerance,
    /// No prior position; decided by earlier executions in the same batch.
    Running,
    /// Nothing matched.
    Default,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Hint => "hint",
            MatchTier::IdMatch => "id_match",
            MatchTier::AttrExact => "attr_exact",
            MatchTier::AttrTolerance => "attr_tolerance",
            MatchTier::Running => "running",
            MatchTier::Default => "default",
        }
    }
}
