//! Source abstraction for raw position and execution rows from a broker export or feed.

use crate::engine::RawRow;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod csv_file;
pub mod mock;

pub use csv_file::CsvPositionSource;
pub use mock::MockPositionSource;

/// Supplier of raw broker rows.
///
/// Rows are returned unparsed; `PositionNormalizer` turns them into legs and executions
/// and sets aside the ones it cannot read.
#[async_trait]
pub trait PositionSource: Send + Sync + fmt::Debug {
    /// Current position rows.
    async fn fetch_positions(&self) -> Result<Vec<RawRow>, SourceError>;

    /// Execution rows, in whatever order the source keeps them.
    async fn fetch_executions(&self) -> Result<Vec<RawRow>, SourceError>;
}

/// Error type for source operations. A failing source aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Io {
            path: "positions.csv".to_string(),
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "I/O error reading positions.csv: not found");

        let err = SourceError::Parse("bad header".to_string());
        assert_eq!(err.to_string(), "Parse error: bad header");

        let err = SourceError::Unavailable("gateway down".to_string());
        assert_eq!(err.to_string(), "Source unavailable: gateway down");
    }
}
