//! Domain primitives: TimeMs, Underlying, Side, Right, SecType.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }
}

impl From<DateTime<Utc>> for TimeMs {
    fn from(value: DateTime<Utc>) -> Self {
        TimeMs(value.timestamp_millis())
    }
}

/// Underlying symbol shared by every leg of a combo (e.g., "SPY", "AAPL").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Underlying(pub String);

impl Underlying {
    /// Create an Underlying, trimming and upper-casing the symbol.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Underlying(symbol.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Underlying {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade side: Buy or Sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side (adds to longs, reduces shorts).
    Buy,
    /// Sell side.
    Sell,
}

impl Side {
    /// Position-delta sign (+1 for Buy, -1 for Sell).
    pub fn sign(&self) -> i32 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    /// Cash-flow sign: selling receives premium, buying pays it.
    pub fn cash_sign(&self) -> i32 {
        -self.sign()
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parse broker side spellings ("BUY", "BOT", "S", "SLD", ...).
    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" | "bot" | "bought" | "long" => Some(Side::Buy),
            "sell" | "s" | "sld" | "sold" | "short" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Right {
    #[serde(rename = "C")]
    Call,
    #[serde(rename = "P")]
    Put,
}

impl Right {
    pub fn parse(s: &str) -> Option<Right> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Some(Right::Call),
            "P" | "PUT" => Some(Right::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Right::Call => "C",
            Right::Put => "P",
        }
    }
}

impl std::fmt::Display for Right {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security type of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecType {
    #[serde(rename = "OPT")]
    Option,
    #[serde(rename = "STK")]
    Stock,
    #[serde(rename = "FUT")]
    Future,
    Other,
}

impl SecType {
    pub fn parse(s: &str) -> SecType {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPT" | "OPTION" | "FOP" => SecType::Option,
            "STK" | "STOCK" | "EQUITY" | "ETF" => SecType::Stock,
            "FUT" | "FUTURE" => SecType::Future,
            _ => SecType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecType::Option => "OPT",
            SecType::Stock => "STK",
            SecType::Future => "FUT",
            SecType::Other => "OTHER",
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, SecType::Option)
    }

    /// Default contract multiplier when the row does not carry one.
    pub fn default_multiplier(&self) -> i64 {
        match self {
            SecType::Option => 100,
            _ => 1,
        }
    }
}

impl std::fmt::Display for SecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
