use crate::config::ConfigError;
use crate::datasource::SourceError;
use crate::db::MigrationError;
use thiserror::Error;

/// Fatal errors for a detection or reconciliation run.
///
/// Per-row problems never surface here; they are carried as [`RowError`] on the
/// rejected row so the rest of the batch keeps going.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Invalid input: {0}")]
    Input(String),
}

/// Why a single position or execution row was left out of processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("no broker id and not enough attributes to synthesize one")]
    UnresolvableIdentity,
}

impl RowError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        RowError::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_display() {
        assert_eq!(
            RowError::MissingField("strike").to_string(),
            "missing required field: strike"
        );
        assert_eq!(
            RowError::invalid("right", "X").to_string(),
            "invalid value for right: X"
        );
    }

    #[test]
    fn test_engine_error_from_migration() {
        let err: EngineError = MigrationError::Drift {
            table: "combos".to_string(),
            missing: vec!["width".to_string()],
        }
        .into();
        assert!(err.to_string().contains("combos"));
    }
}
