//! Position snapshot storage and prior-baseline lookup.

use crate::domain::{Leg, PositionSnapshot, TimeMs};
use crate::engine::{PriorPositionResolver, ResolvedPrior};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::Repository;

impl Repository {
    /// Persist a snapshot; returns its generated id.
    ///
    /// # Errors
    /// Returns an error if the legs cannot be encoded or the insert fails.
    pub async fn store_snapshot(&self, snapshot: &PositionSnapshot) -> Result<String, sqlx::Error> {
        let legs_json = serde_json::to_string(&snapshot.legs)
            .map_err(|e| sqlx::Error::Protocol(format!("encoding snapshot legs: {}", e)))?;
        let snapshot_id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO position_snapshots (snapshot_id, taken_ms, legs_json, stored_ms)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot_id)
        .bind(snapshot.taken_ms.as_ms())
        .bind(legs_json)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(snapshot_id)
    }

    /// Baseline for executions starting at `reference`.
    ///
    /// Same degradation as [`PriorPositionResolver::resolve`]: the latest snapshot taken
    /// strictly before `reference`, else the latest stored one, else None.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored payload cannot be decoded.
    pub async fn snapshot_before(
        &self,
        reference: TimeMs,
    ) -> Result<Option<ResolvedPrior>, sqlx::Error> {
        let strict = sqlx::query(
            r#"
            SELECT taken_ms, legs_json FROM position_snapshots
            WHERE taken_ms < ?
            ORDER BY taken_ms DESC, stored_ms DESC
            LIMIT 1
            "#,
        )
        .bind(reference.as_ms())
        .fetch_optional(&self.pool)
        .await?;

        let latest = sqlx::query(
            r#"
            SELECT taken_ms, legs_json FROM position_snapshots
            ORDER BY taken_ms DESC, stored_ms DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let mut candidates = Vec::new();
        for row in strict.iter().chain(latest.iter()) {
            candidates.push(snapshot_from_row(row)?);
        }
        Ok(PriorPositionResolver::resolve(&candidates, reference))
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<PositionSnapshot, sqlx::Error> {
    let legs_json: String = row.get("legs_json");
    let legs: Vec<Leg> =
        serde_json::from_str(&legs_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(PositionSnapshot::new(
        TimeMs::new(row.get::<i64, _>("taken_ms")),
        legs,
    ))
}
