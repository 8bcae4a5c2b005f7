//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `combos.rs` - Combo lifecycle upserts, loads and backfill patches
//! - `snapshots.rs` - Position snapshot storage and prior lookup

mod combos;
mod snapshots;

pub use combos::UpsertOutcome;

use crate::domain::{Decimal, TimeMs};
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of store runs recorded so far.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_runs(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM store_runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }
}

fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn decimal_to_sql(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_canonical_string())
}

fn time_column(row: &SqliteRow, column: &str) -> Option<TimeMs> {
    row.get::<Option<i64>, _>(column).map(TimeMs::new)
}

/// Optional decimal column; unparseable values are logged and read as null.
fn decimal_column(row: &SqliteRow, column: &str, owner: &str) -> Option<Decimal> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| match Decimal::from_str_canonical(&s) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(owner = %owner, column = %column, value = %s, error = %e, "Failed to parse stored decimal, ignoring");
            None
        }
    })
}

fn date_column(row: &SqliteRow, column: &str, owner: &str) -> Option<NaiveDate> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| match NaiveDate::parse_from_str(&s, DATE_FORMAT) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(owner = %owner, column = %column, value = %s, error = %e, "Failed to parse stored date, ignoring");
            None
        }
    })
}

/// Optional column parsed through `FromStr`; unknown labels are logged and read as null.
fn parsed_column<T>(row: &SqliteRow, column: &str, owner: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| match s.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(owner = %owner, column = %column, value = %s, error = %e, "Unknown stored label, ignoring");
            None
        }
    })
}
