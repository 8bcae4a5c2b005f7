//! Source backed by headed CSV exports on disk.

use super::{PositionSource, SourceError};
use crate::engine::RawRow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reads positions and executions from CSV files. An unset path yields no rows.
#[derive(Debug, Clone, Default)]
pub struct CsvPositionSource {
    positions_path: Option<PathBuf>,
    executions_path: Option<PathBuf>,
}

impl CsvPositionSource {
    pub fn new(positions_path: Option<PathBuf>, executions_path: Option<PathBuf>) -> Self {
        Self {
            positions_path,
            executions_path,
        }
    }
}

async fn read_rows(path: Option<&Path>) -> Result<Vec<RawRow>, SourceError> {
    let Some(path) = path else {
        debug!("No CSV path configured; returning no rows");
        return Ok(Vec::new());
    };
    let bytes = tokio::fs::read(path).await.map_err(|e| SourceError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let rows = RawRow::from_csv_reader(bytes.as_slice())
        .map_err(|e| SourceError::Parse(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), rows = rows.len(), "Read CSV rows");
    Ok(rows)
}

#[async_trait]
impl PositionSource for CsvPositionSource {
    async fn fetch_positions(&self) -> Result<Vec<RawRow>, SourceError> {
        read_rows(self.positions_path.as_deref()).await
    }

    async fn fetch_executions(&self) -> Result<Vec<RawRow>, SourceError> {
        read_rows(self.executions_path.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_headed_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("positions.csv");
        std::fs::write(
            &path,
            "Symbol,SecType,Expiry,Right,Strike,Position\nSPY,OPT,20240119,C,100,-1\nSPY,OPT,20240119,C,105,1\n",
        )
        .unwrap();

        let source = CsvPositionSource::new(Some(path), None);
        let rows = source.fetch_positions().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(&["symbol"]), Some("SPY"));
        assert_eq!(rows[1].get(&["strike"]), Some("105"));
        assert!(source.fetch_executions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = CsvPositionSource::new(None, Some(temp_dir.path().join("nope.csv")));
        assert!(matches!(
            source.fetch_executions().await,
            Err(SourceError::Io { .. })
        ));
    }
}
