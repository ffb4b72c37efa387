//! Round lifecycle operations.
//!
//! 1. `insert_round` — the dispatch cycle of an official round creates its row
//! 2. `record_round` — the result recorder inserts every check and marks the
//!    round completed in one transaction
//! 3. `get_max_round_number` — `--resume` continues at `max + 1`
//! 4. `delete_rounds_and_checks` — administrative `--reset`

use super::{Database, NewCheck, RoundRow};
use anyhow::Result;
use chrono::{DateTime, Utc};

impl Database {
    /// Insert a new, incomplete round. Fails if the number already exists.
    pub async fn insert_round(&self, number: i32) -> Result<()> {
        sqlx::query("INSERT INTO rounds (number, completed, start) VALUES ($1, FALSE, NOW())")
            .bind(number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert all check results of a round and mark it completed.
    ///
    /// Runs in one transaction: if any insert or the round update fails the
    /// transaction is dropped (rolled back) and the round stays incomplete.
    pub async fn record_round(
        &self,
        number: i32,
        checks: &[NewCheck],
        finish: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for check in checks {
            sqlx::query(
                "INSERT INTO checks (team_id, service_id, round, time, passed, output)
                 VALUES ($1, $2, $3, NOW(), $4, $5)",
            )
            .bind(check.team_id)
            .bind(check.service_id)
            .bind(check.round)
            .bind(check.passed)
            .bind(&check.output)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query("UPDATE rounds SET completed = TRUE, finish = $2 WHERE number = $1")
            .bind(number)
            .bind(finish)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            anyhow::bail!("round {} does not exist", number);
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_round(&self, number: i32) -> Result<Option<RoundRow>> {
        let row = sqlx::query_as::<_, RoundRow>(
            "SELECT id, number, completed, start, finish FROM rounds WHERE number = $1",
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All rounds, oldest first.
    pub async fn get_rounds(&self) -> Result<Vec<RoundRow>> {
        let rows = sqlx::query_as::<_, RoundRow>(
            "SELECT id, number, completed, start, finish FROM rounds ORDER BY number",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Highest persisted round number, or `None` when no round exists.
    pub async fn get_max_round_number(&self) -> Result<Option<i32>> {
        let max: Option<i32> = sqlx::query_scalar("SELECT MAX(number) FROM rounds")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    /// Discard every round and check result.
    pub async fn delete_rounds_and_checks(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM checks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM rounds").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
