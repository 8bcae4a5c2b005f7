//! Mock source for testing without files or a broker connection.

use super::{PositionSource, SourceError};
use crate::engine::RawRow;
use async_trait::async_trait;

/// Mock source that returns predefined rows, or a fixed error.
#[derive(Debug, Clone, Default)]
pub struct MockPositionSource {
    positions: Vec<RawRow>,
    executions: Vec<RawRow>,
    failure: Option<SourceError>,
}

impl MockPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, row: RawRow) -> Self {
        self.positions.push(row);
        self
    }

    pub fn with_positions(mut self, rows: Vec<RawRow>) -> Self {
        self.positions.extend(rows);
        self
    }

    pub fn with_execution(mut self, row: RawRow) -> Self {
        self.executions.push(row);
        self
    }

    pub fn with_executions(mut self, rows: Vec<RawRow>) -> Self {
        self.executions.extend(rows);
        self
    }

    /// Make every fetch fail with `error`.
    pub fn with_failure(mut self, error: SourceError) -> Self {
        self.failure = Some(error);
        self
    }

    fn check(&self) -> Result<(), SourceError> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PositionSource for MockPositionSource {
    async fn fetch_positions(&self) -> Result<Vec<RawRow>, SourceError> {
        self.check()?;
        Ok(self.positions.clone())
    }

    async fn fetch_executions(&self) -> Result<Vec<RawRow>, SourceError> {
        self.check()?;
        Ok(self.executions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(symbol: &str) -> RawRow {
        RawRow::from_pairs([("symbol", symbol), ("sec_type", "STK"), ("position", "100")])
    }

    #[tokio::test]
    async fn test_mock_returns_rows() {
        let mock = MockPositionSource::new()
            .with_position(row("AAPL"))
            .with_executions(vec![row("MSFT"), row("SPY")]);
        assert_eq!(mock.fetch_positions().await.unwrap(), vec![row("AAPL")]);
        assert_eq!(mock.fetch_executions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockPositionSource::new()
            .with_position(row("AAPL"))
            .with_failure(SourceError::Unavailable("offline".to_string()));
        assert!(matches!(
            mock.fetch_positions().await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_empty_mock_from_sync_context() {
        let mock = MockPositionSource::new();
        let rows = tokio_test::block_on(mock.fetch_executions()).unwrap();
        assert!(rows.is_empty());
    }
}
