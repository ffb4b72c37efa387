//! # Database — PostgreSQL Storage Layer
//!
//! Async database operations for the scoreboard via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `rounds`: number (unique), completed, start, finish
//! - `teams`: name (unique), enabled, check_team
//! - `services`: name (unique), check_group, check_function, enabled
//! - `team_service`: per-team service configuration rows (multi-valued keys allowed)
//! - `checks`: one row per (team, service, official round)
//!
//! ## Module Structure
//!
//! Operations are split into submodules by entity:
//!
//! - [`rounds`] — round creation, completion (transactional), resume, reset
//! - [`teams`] — team listing and enable/disable
//! - [`services`] — service listing, enable/disable, team-service configuration
//! - [`checks`] — check result queries
//! - [`setup`] — schema bootstrap and seeding from configuration
//!
//! Every method takes its own connection from the pool (or its own
//! transaction) and releases it before returning; nothing holds a handle
//! across a dispatch cycle's fan-out.

mod checks;
mod rounds;
mod services;
pub mod setup;
mod teams;

use crate::store::{ScoreStore, Selection};
use crate::task::CheckId;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

// ── Row types ───────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct RoundRow {
    pub id: i32,
    pub number: i32,
    pub completed: bool,
    pub start: DateTime<Utc>,
    pub finish: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct TeamRow {
    pub id: i32,
    pub name: String,
    pub enabled: bool,
    pub check_team: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: i32,
    pub name: String,
    pub check_group: String,
    pub check_function: String,
    pub enabled: bool,
}

impl ServiceRow {
    pub fn check_id(&self) -> CheckId {
        CheckId::new(&self.check_group, &self.check_function)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct TeamServiceRow {
    pub team_id: i32,
    pub service_id: i32,
    pub key: String,
    pub value: String,
    pub edit: bool,
    pub hidden: bool,
    pub sort_order: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct CheckRow {
    pub id: i32,
    pub team_id: i32,
    pub service_id: i32,
    pub round: i32,
    pub time: DateTime<Utc>,
    pub passed: bool,
    pub output: String,
}

/// A check result about to be written by the result recorder.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCheck {
    pub team_id: i32,
    pub service_id: i32,
    pub round: i32,
    pub passed: bool,
    pub output: String,
}

// ── Connection ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Percent-encoded credentials in the URL are decoded before use.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

// ── ScoreStore ──────────────────────────────────────────────────

#[async_trait]
impl ScoreStore for Database {
    async fn teams(&self, selection: &Selection) -> Result<Vec<TeamRow>> {
        self.get_teams(selection).await
    }

    async fn services(&self, selection: &Selection) -> Result<Vec<ServiceRow>> {
        self.get_services(selection).await
    }

    async fn team_service_rows(
        &self,
        team_ids: &[i32],
        service_ids: &[i32],
    ) -> Result<Vec<TeamServiceRow>> {
        self.get_team_service_rows(team_ids, service_ids).await
    }

    async fn create_round(&self, number: i32) -> Result<()> {
        self.insert_round(number).await
    }

    async fn complete_round(
        &self,
        number: i32,
        checks: &[NewCheck],
        finish: DateTime<Utc>,
    ) -> Result<()> {
        self.record_round(number, checks, finish).await
    }

    async fn max_round_number(&self) -> Result<Option<i32>> {
        self.get_max_round_number().await
    }

    async fn reset_rounds(&self) -> Result<()> {
        self.delete_rounds_and_checks().await
    }

    async fn set_team_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        self.update_team_enabled(id, enabled).await
    }

    async fn set_service_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        self.update_service_enabled(id, enabled).await
    }

    async fn round(&self, number: i32) -> Result<Option<RoundRow>> {
        self.get_round(number).await
    }

    async fn checks_for_round(&self, number: i32) -> Result<Vec<CheckRow>> {
        self.get_checks_for_round(number).await
    }
}
