//! Service and team-service configuration queries.

use super::{Database, ServiceRow, TeamServiceRow};
use crate::store::Selection;
use anyhow::Result;

impl Database {
    /// Services matching `selection`, ordered by id.
    pub async fn get_services(&self, selection: &Selection) -> Result<Vec<ServiceRow>> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, name, check_group, check_function, enabled FROM services
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

    pub async fn update_service_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        let updated = sqlx::query("UPDATE services SET enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            anyhow::bail!("no service with id {}", id);
        }
        Ok(())
    }

    /// Configuration rows for every (team, service) pair in the given id sets.
    pub async fn get_team_service_rows(
        &self,
        team_ids: &[i32],
        service_ids: &[i32],
    ) -> Result<Vec<TeamServiceRow>> {
        let rows = sqlx::query_as::<_, TeamServiceRow>(
            "SELECT team_id, service_id, key, value, edit, hidden, sort_order
             FROM team_service
             WHERE team_id = ANY($1) AND service_id = ANY($2)
             ORDER BY team_id, service_id, sort_order, id",
        )
        .bind(team_ids)
        .bind(service_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
