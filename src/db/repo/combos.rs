//! Combo lifecycle operations for the repository.

use crate::domain::{Combo, ComboRecord, LegRecord, Right, SecType, TimeMs, Underlying};
use crate::engine::BackfillPatch;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    date_column, date_to_sql, decimal_column, decimal_to_sql, parsed_column, time_column,
    Repository,
};

/// Transitions applied by one store run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub run_id: String,
    pub inserted: usize,
    pub updated: usize,
    /// Previously closed combos re-observed by a newer snapshot.
    pub reopened: usize,
    /// Active combos absent from this run, now closed.
    pub closed: Vec<String>,
}

const COMBO_COLUMNS: &str = "combo_id, underlying, expiry, structure, combo_type, width, \
     credit_debit, parent_combo_id, has_stock_leg, created_ms, last_seen_ms, closed_ms, backfilled_ms";

impl Repository {
    /// Record the combos observed at `as_of` and close every active combo not among them.
    ///
    /// The whole run is one transaction. Its first statement is a write, so SQLite's write
    /// lock is held from the start and concurrent runs serialize. Closure and reopening are
    /// guarded by timestamps: a run older than the store's state can neither close a combo
    /// seen later nor reopen one closed later.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is committed in that case.
    pub async fn upsert_combos(
        &self,
        combos: &[Combo],
        as_of: TimeMs,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let run_id = Uuid::new_v4().to_string();
        let mut outcome = UpsertOutcome {
            run_id: run_id.clone(),
            ..UpsertOutcome::default()
        };
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO store_runs (run_id, as_of_ms, started_ms) VALUES (?, ?, ?)")
            .bind(&run_id)
            .bind(as_of.as_ms())
            .bind(TimeMs::now().as_ms())
            .execute(&mut *tx)
            .await?;

        for combo in combos {
            let prior = sqlx::query("SELECT closed_ms, last_seen_ms FROM combos WHERE combo_id = ?")
                .bind(&combo.combo_id)
                .fetch_optional(&mut *tx)
                .await?;
            let prior: Option<(Option<i64>, Option<i64>)> =
                prior.map(|row| (row.get("closed_ms"), row.get("last_seen_ms")));

            upsert_combo_row(&mut tx, combo, as_of).await?;

            match prior {
                None => outcome.inserted += 1,
                Some((closed_ms, _)) => {
                    outcome.updated += 1;
                    if closed_ms.is_some_and(|c| c < as_of.as_ms()) {
                        debug!(combo_id = %combo.combo_id, "Reopening combo");
                        outcome.reopened += 1;
                    }
                }
            }

            let fresh = prior.map_or(true, |(_, last_seen)| last_seen.unwrap_or(0) <= as_of.as_ms());
            if fresh {
                let legs: Vec<LegRecord> = combo.legs.iter().map(LegRecord::from_leg).collect();
                replace_legs(&mut tx, &combo.combo_id, &legs).await?;
            }
        }

        let stale = sqlx::query(
            r#"
            SELECT combo_id FROM combos
            WHERE closed_ms IS NULL AND COALESCE(last_seen_ms, 0) < ?
            ORDER BY combo_id ASC
            "#,
        )
        .bind(as_of.as_ms())
        .fetch_all(&mut *tx)
        .await?;
        outcome.closed = stale.iter().map(|r| r.get::<String, _>("combo_id")).collect();

        sqlx::query(
            r#"
            UPDATE combos SET closed_ms = ?
            WHERE closed_ms IS NULL AND COALESCE(last_seen_ms, 0) < ?
            "#,
        )
        .bind(as_of.as_ms())
        .bind(as_of.as_ms())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE store_runs SET inserted = ?, updated = ?, reopened = ?, closed = ? WHERE run_id = ?",
        )
        .bind(outcome.inserted as i64)
        .bind(outcome.updated as i64)
        .bind(outcome.reopened as i64)
        .bind(outcome.closed.len() as i64)
        .bind(&run_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            run_id = %run_id,
            as_of_ms = as_of.as_ms(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            reopened = outcome.reopened,
            closed = outcome.closed.len(),
            "Combo store run committed"
        );
        Ok(outcome)
    }

    /// Write a record as-is (no lifecycle bookkeeping). Used to import rows produced
    /// elsewhere, which the backfill then completes.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn import_combo_record(&self, record: &ComboRecord) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO combos
            (combo_id, underlying, expiry, structure, combo_type, width, credit_debit,
             parent_combo_id, has_stock_leg, created_ms, last_seen_ms, closed_ms, backfilled_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.combo_id)
        .bind(record.underlying.as_str())
        .bind(date_to_sql(record.expiry))
        .bind(record.structure.map(|s| s.as_str()))
        .bind(record.combo_type.map(|s| s.as_str()))
        .bind(decimal_to_sql(record.width))
        .bind(record.credit_debit.map(|c| c.as_str()))
        .bind(record.parent_combo_id.as_deref())
        .bind(record.has_stock_leg)
        .bind(record.created_ms.map(|t| t.as_ms()))
        .bind(record.last_seen_ms.map(|t| t.as_ms()))
        .bind(record.closed_ms.map(|t| t.as_ms()))
        .bind(record.backfilled_ms.map(|t| t.as_ms()))
        .execute(&mut *tx)
        .await?;
        replace_legs(&mut tx, &record.combo_id, &record.legs).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Load combos with their legs, ordered by underlying, expiry and id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn load_combos(&self, active_only: bool) -> Result<Vec<ComboRecord>, sqlx::Error> {
        let filter = if active_only {
            "WHERE closed_ms IS NULL"
        } else {
            ""
        };
        self.load_where(filter).await
    }

    /// Combos whose inferred metadata has never been filled in.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn load_pending_backfill(&self) -> Result<Vec<ComboRecord>, sqlx::Error> {
        self.load_where("WHERE backfilled_ms IS NULL").await
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_combo(&self, combo_id: &str) -> Result<Option<ComboRecord>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM combos WHERE combo_id = ?",
            COMBO_COLUMNS
        ))
        .bind(combo_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let leg_rows = sqlx::query(
            r#"
            SELECT combo_id, leg_id, sec_type, expiry, option_right, strike, qty, multiplier, avg_cost
            FROM legs WHERE combo_id = ?
            ORDER BY leg_id ASC
            "#,
        )
        .bind(combo_id)
        .fetch_all(&self.pool)
        .await?;
        let legs = leg_rows.iter().map(leg_from_row).collect();
        Ok(Some(record_from_row(&row, legs)))
    }

    /// Fill still-null metadata from `patch` and stamp the record as backfilled.
    ///
    /// Returns false when the record was already backfilled (or no longer exists).
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn apply_backfill(
        &self,
        patch: &BackfillPatch,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE combos SET
                expiry = COALESCE(expiry, ?),
                structure = COALESCE(structure, ?),
                combo_type = COALESCE(combo_type, ?),
                width = COALESCE(width, ?),
                credit_debit = COALESCE(credit_debit, ?),
                parent_combo_id = COALESCE(parent_combo_id, ?),
                backfilled_ms = ?
            WHERE combo_id = ? AND backfilled_ms IS NULL
            "#,
        )
        .bind(date_to_sql(patch.expiry))
        .bind(patch.structure.map(|s| s.as_str()))
        .bind(patch.combo_type.map(|s| s.as_str()))
        .bind(decimal_to_sql(patch.width))
        .bind(patch.credit_debit.map(|c| c.as_str()))
        .bind(patch.parent_combo_id.as_deref())
        .bind(now.as_ms())
        .bind(&patch.combo_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_where(&self, filter: &str) -> Result<Vec<ComboRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM combos {} ORDER BY underlying ASC, expiry ASC, combo_id ASC",
            COMBO_COLUMNS, filter
        ))
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let leg_rows = sqlx::query(
            r#"
            SELECT combo_id, leg_id, sec_type, expiry, option_right, strike, qty, multiplier, avg_cost
            FROM legs
            ORDER BY combo_id ASC, leg_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut legs_by_combo: HashMap<String, Vec<LegRecord>> = HashMap::new();
        for row in &leg_rows {
            legs_by_combo
                .entry(row.get::<String, _>("combo_id"))
                .or_default()
                .push(leg_from_row(row));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let combo_id: String = row.get("combo_id");
                let legs = legs_by_combo.remove(&combo_id).unwrap_or_default();
                record_from_row(row, legs)
            })
            .collect())
    }
}

async fn upsert_combo_row(
    tx: &mut Transaction<'_, Sqlite>,
    combo: &Combo,
    as_of: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO combos
        (combo_id, underlying, expiry, structure, combo_type, width, credit_debit,
         parent_combo_id, has_stock_leg, created_ms, last_seen_ms, closed_ms, backfilled_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)
        ON CONFLICT(combo_id) DO UPDATE SET
            expiry = COALESCE(combos.expiry, excluded.expiry),
            structure = COALESCE(combos.structure, excluded.structure),
            combo_type = COALESCE(combos.combo_type, excluded.combo_type),
            width = COALESCE(combos.width, excluded.width),
            credit_debit = COALESCE(combos.credit_debit, excluded.credit_debit),
            parent_combo_id = COALESCE(combos.parent_combo_id, excluded.parent_combo_id),
            has_stock_leg = excluded.has_stock_leg,
            created_ms = COALESCE(combos.created_ms, excluded.created_ms),
            last_seen_ms = MAX(COALESCE(combos.last_seen_ms, 0), excluded.last_seen_ms),
            closed_ms = CASE
                WHEN combos.closed_ms IS NOT NULL AND combos.closed_ms < excluded.last_seen_ms
                THEN NULL
                ELSE combos.closed_ms
            END
        "#,
    )
    .bind(&combo.combo_id)
    .bind(combo.underlying.as_str())
    .bind(date_to_sql(combo.expiry))
    .bind(combo.structure.as_str())
    .bind(combo.structure.as_str())
    .bind(decimal_to_sql(combo.width))
    .bind(combo.credit_debit.map(|c| c.as_str()))
    .bind(combo.parent_combo_id.as_deref())
    .bind(combo.has_stock_leg)
    .bind(combo.created_ms.unwrap_or(as_of).as_ms())
    .bind(as_of.as_ms())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_legs(
    tx: &mut Transaction<'_, Sqlite>,
    combo_id: &str,
    legs: &[LegRecord],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM legs WHERE combo_id = ?")
        .bind(combo_id)
        .execute(&mut **tx)
        .await?;

    for leg in legs {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO legs
            (combo_id, leg_id, sec_type, expiry, option_right, strike, qty, multiplier, avg_cost)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(combo_id)
        .bind(&leg.leg_id)
        .bind(leg.sec_type.as_str())
        .bind(date_to_sql(leg.expiry))
        .bind(leg.right.map(|r| r.as_str()))
        .bind(decimal_to_sql(leg.strike))
        .bind(decimal_to_sql(leg.qty))
        .bind(decimal_to_sql(leg.multiplier))
        .bind(decimal_to_sql(leg.avg_cost))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn record_from_row(row: &SqliteRow, legs: Vec<LegRecord>) -> ComboRecord {
    let combo_id: String = row.get("combo_id");
    ComboRecord {
        underlying: Underlying::new(row.get::<String, _>("underlying")),
        expiry: date_column(row, "expiry", &combo_id),
        structure: parsed_column(row, "structure", &combo_id),
        combo_type: parsed_column(row, "combo_type", &combo_id),
        width: decimal_column(row, "width", &combo_id),
        credit_debit: parsed_column(row, "credit_debit", &combo_id),
        parent_combo_id: row.get("parent_combo_id"),
        has_stock_leg: row.get::<i64, _>("has_stock_leg") != 0,
        created_ms: time_column(row, "created_ms"),
        last_seen_ms: time_column(row, "last_seen_ms"),
        closed_ms: time_column(row, "closed_ms"),
        backfilled_ms: time_column(row, "backfilled_ms"),
        legs,
        combo_id,
    }
}

fn leg_from_row(row: &SqliteRow) -> LegRecord {
    let leg_id: String = row.get("leg_id");
    LegRecord {
        sec_type: SecType::parse(&row.get::<String, _>("sec_type")),
        expiry: date_column(row, "expiry", &leg_id),
        right: row
            .get::<Option<String>, _>("option_right")
            .as_deref()
            .and_then(Right::parse),
        strike: decimal_column(row, "strike", &leg_id),
        qty: decimal_column(row, "qty", &leg_id),
        multiplier: decimal_column(row, "multiplier", &leg_id),
        avg_cost: decimal_column(row, "avg_cost", &leg_id),
        leg_id,
    }
}
