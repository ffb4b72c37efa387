//! Check result queries. Rows are only ever written by
//! [`Database::record_round`](super::Database::record_round).

use super::{CheckRow, Database};
use anyhow::Result;

impl Database {
    /// Check results of one round, ordered by team then service.
    pub async fn get_checks_for_round(&self, round: i32) -> Result<Vec<CheckRow>> {
        let rows = sqlx::query_as::<_, CheckRow>(
            "SELECT id, team_id, service_id, round, time, passed, output
             FROM checks WHERE round = $1
             ORDER BY team_id, service_id",
        )
        .bind(round)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Total number of check rows (for `db` listings and tests).
    pub async fn count_checks(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
