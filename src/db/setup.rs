//! Schema bootstrap and seeding (`scoreengine db init`).
//!
//! Recreates every table, then seeds from configuration:
//!
//! - teams `minimum..=maximum` named `Team N`; team `maximum` is the check team
//! - one service per `[[services]]` entry
//! - for every team and service, one `team_service` row per datum with
//!   `{team}` substituted and `sort_order` set to the datum's position

use super::Database;
use crate::config::Config;
use anyhow::Result;
use tracing::debug;

const SCHEMA: &str = include_str!("../../migrations/001_scoring_schema.sql");

/// Counts of seeded rows, reported by the CLI.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub teams: usize,
    pub services: usize,
    pub team_service_rows: usize,
}

impl Database {
    /// Drop and recreate all tables.
    pub async fn init_schema(&self) -> Result<()> {
        debug!("Re-creating database tables");
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Recreate the schema and seed teams, services and team-service rows.
    pub async fn init_from_config(&self, config: &Config) -> Result<SeedSummary> {
        self.init_schema().await?;

        let mut summary = SeedSummary::default();
        let mut tx = self.pool.begin().await?;

        let mut teams = Vec::new();
        for number in config.teams.minimum..=config.teams.maximum {
            let is_check_team = number == config.teams.maximum;
            debug!(team = number, check_team = is_check_team, "Creating team");
            let id: i32 = sqlx::query_scalar(
                "INSERT INTO teams (name, enabled, check_team) VALUES ($1, TRUE, $2) RETURNING id",
            )
            .bind(format!("Team {}", number))
            .bind(is_check_team)
            .fetch_one(&mut *tx)
            .await?;
            teams.push((number, id));
            summary.teams += 1;
        }

        for service in &config.services {
            let check = service.check_id().ok_or_else(|| {
                anyhow::anyhow!("service '{}' has malformed check '{}'", service.name, service.check)
            })?;
            debug!(service = %service.name, check = %check, "Adding service for all teams");
            let service_id: i32 = sqlx::query_scalar(
                "INSERT INTO services (name, check_group, check_function, enabled)
                 VALUES ($1, $2, $3, TRUE) RETURNING id",
            )
            .bind(&service.name)
            .bind(&check.group)
            .bind(&check.function)
            .fetch_one(&mut *tx)
            .await?;
            summary.services += 1;

            for &(number, team_id) in &teams {
                for (order, datum) in service.data.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO team_service (team_id, service_id, key, value, edit, hidden, sort_order)
                         VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    )
                    .bind(team_id)
                    .bind(service_id)
                    .bind(&datum.key)
                    .bind(datum.render(number))
                    .bind(datum.edit)
                    .bind(datum.hidden)
                    .bind(order as i32)
                    .execute(&mut *tx)
                    .await?;
                    summary.team_service_rows += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(summary)
    }
}
