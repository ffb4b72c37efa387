//! Team queries. Teams are created by `db init` and afterwards only toggled
//! between enabled and disabled; disabling never touches historical checks.

use super::{Database, TeamRow};
use crate::store::Selection;
use anyhow::Result;

impl Database {
    /// Teams matching `selection`, ordered by id.
    pub async fn get_teams(&self, selection: &Selection) -> Result<Vec<TeamRow>> {
        let rows = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, enabled, check_team FROM teams
             WHERE ($1 = FALSE OR enabled)
               AND ($2::INTEGER[] IS NULL OR id = ANY($2))
             ORDER BY id",
        )
        .bind(selection.enabled_only)
        .bind(selection.ids.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_team_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        let updated = sqlx::query("UPDATE teams SET enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            anyhow::bail!("no team with id {}", id);
        }
        Ok(())
    }
}
