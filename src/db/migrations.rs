//! Database migrations and initialization.
//!
//! Schema evolution is additive only: tables are created when absent and expected columns
//! missing from an older file are added as nullable columns. Nothing is ever dropped.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Columns every store file must carry, beyond each table's key.
///
/// Declarations must stay nullable so `ALTER TABLE ... ADD COLUMN` works on populated tables.
const EXPECTED_COLUMNS: &[(&str, &[(&str, &str)])] = &[
    (
        "combos",
        &[
            ("expiry", "TEXT"),
            ("structure", "TEXT"),
            ("combo_type", "TEXT"),
            ("width", "TEXT"),
            ("credit_debit", "TEXT"),
            ("parent_combo_id", "TEXT"),
            ("has_stock_leg", "INTEGER NOT NULL DEFAULT 0"),
            ("created_ms", "INTEGER"),
            ("last_seen_ms", "INTEGER"),
            ("closed_ms", "INTEGER"),
            ("backfilled_ms", "INTEGER"),
        ],
    ),
    (
        "legs",
        &[
            ("expiry", "TEXT"),
            ("option_right", "TEXT"),
            ("strike", "TEXT"),
            ("qty", "TEXT"),
            ("multiplier", "TEXT"),
            ("avg_cost", "TEXT"),
        ],
    ),
    (
        "store_runs",
        &[
            ("inserted", "INTEGER"),
            ("updated", "INTEGER"),
            ("reopened", "INTEGER"),
            ("closed", "INTEGER"),
        ],
    ),
];

/// What to do when an existing store file lacks expected columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationPolicy {
    /// Add the missing columns (nullable) and continue.
    #[default]
    Additive,
    /// Refuse to open the store.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_path: String,
    pub migration_policy: MigrationPolicy,
}

impl StoreConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            migration_policy: MigrationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MigrationPolicy) -> Self {
        self.migration_policy = policy;
        self
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schema drift in table {table}: missing columns {missing:?}")]
    Drift { table: String, missing: Vec<String> },
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Initialize the SQLite database with schema and pragmas.
pub async fn init_db(config: &StoreConfig) -> Result<SqlitePool, MigrationError> {
    let db_path = config.database_path.as_str();
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_pragmas_conn(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    run_migrations(&pool, config.migration_policy).await?;

    info!("Database initialized successfully at {}", db_path);
    Ok(pool)
}

/// Statements of `schema.sql`, with `--` comments removed before splitting on `;`.
fn schema_statements() -> Vec<String> {
    let without_comments = include_str!("schema.sql")
        .lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(|stmt| stmt.trim().to_string())
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

/// Create tables, reconcile columns, then create indexes (which may reference added columns).
async fn run_migrations(pool: &SqlitePool, policy: MigrationPolicy) -> Result<(), MigrationError> {
    info!("Running database migrations...");
    let (tables, rest): (Vec<String>, Vec<String>) = schema_statements()
        .into_iter()
        .partition(|stmt| stmt.starts_with("CREATE TABLE"));

    for statement in &tables {
        sqlx::query(statement).execute(pool).await?;
    }

    ensure_columns(pool, policy).await?;

    for statement in &rest {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Migrations completed successfully");
    Ok(())
}

async fn ensure_columns(pool: &SqlitePool, policy: MigrationPolicy) -> Result<(), MigrationError> {
    for (table, columns) in EXPECTED_COLUMNS {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await?;
        let present: HashSet<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();

        let missing: Vec<&(&str, &str)> = columns
            .iter()
            .filter(|(name, _)| !present.contains(*name))
            .collect();
        if missing.is_empty() {
            continue;
        }

        if policy == MigrationPolicy::Strict {
            return Err(MigrationError::Drift {
                table: table.to_string(),
                missing: missing.iter().map(|(name, _)| name.to_string()).collect(),
            });
        }

        for (name, decl) in missing {
            warn!(table = %table, column = %name, "Adding missing column");
            sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, decl))
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Configure SQLite pragmas for optimal performance and reliability.
async fn configure_pragmas_conn(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the actual mode set; must use fetch to get result
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    info!("SQLite journal_mode set to: {}", journal_mode);

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db_path(temp_dir: &TempDir) -> String {
        temp_dir
            .path()
            .join("combos.db")
            .to_string_lossy()
            .to_string()
    }

    async fn legacy_file(path: &str) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE combos (combo_id TEXT PRIMARY KEY, underlying TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO combos (combo_id, underlying) VALUES ('combo:legacy', 'SPY')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    #[test]
    fn test_schema_statements_drop_comments() {
        let statements = schema_statements();
        assert!(statements.iter().all(|s| !s.contains("--")));
        assert!(statements
            .iter()
            .all(|s| s.starts_with("CREATE TABLE") || s.starts_with("CREATE INDEX")));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS combos")));
        let tables = statements
            .iter()
            .filter(|s| s.starts_with("CREATE TABLE"))
            .count();
        assert_eq!(tables, 4);
    }

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);
        let pool = init_db(&StoreConfig::new(&path)).await.expect("init_db failed");
        assert!(Path::new(&path).exists());

        for table in ["combos", "legs", "position_snapshots", "store_runs"] {
            let result: (String,) =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .expect("query failed");
            assert_eq!(result.0, table);
        }
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&StoreConfig::new(db_path(&temp_dir)))
            .await
            .expect("init_db failed");

        run_migrations(&pool, MigrationPolicy::Strict)
            .await
            .expect("second migration run failed");
    }

    #[tokio::test]
    async fn test_additive_policy_adds_missing_columns() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);
        legacy_file(&path).await;

        let pool = init_db(&StoreConfig::new(&path)).await.expect("init_db failed");
        let row: (String, Option<String>, Option<i64>) =
            sqlx::query_as("SELECT combo_id, structure, backfilled_ms FROM combos")
                .fetch_one(&pool)
                .await
                .expect("query failed");
        assert_eq!(row.0, "combo:legacy");
        assert_eq!(row.1, None);
        assert_eq!(row.2, None);
    }

    #[tokio::test]
    async fn test_strict_policy_reports_drift() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);
        legacy_file(&path).await;

        let err = init_db(&StoreConfig::new(&path).with_policy(MigrationPolicy::Strict))
            .await
            .unwrap_err();
        match err {
            MigrationError::Drift { table, missing } => {
                assert_eq!(table, "combos");
                assert!(missing.contains(&"closed_ms".to_string()));
            }
            other => panic!("expected drift, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_pragmas_configured() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&StoreConfig::new(db_path(&temp_dir)))
            .await
            .expect("init_db failed");

        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);

        let result: (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 5000);
    }
}
