//! # Store — Scoreboard Persistence Interface
//!
//! [`ScoreStore`] is the persistence boundary used by the task builder,
//! result recorder, scheduler and CLI. Two implementations exist:
//!
//! - [`Database`](crate::db::Database) — PostgreSQL, used in production
//! - [`MemoryStore`] — in-process, used by tests and local experiments
//!
//! Each method is one scoped unit of work: it acquires whatever it needs,
//! commits or rolls back, and releases before returning.

mod memory;

pub use memory::MemoryStore;

use crate::db::{CheckRow, NewCheck, RoundRow, ServiceRow, TeamRow, TeamServiceRow};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Which teams or services a query returns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Only rows with `enabled = true`.
    pub enabled_only: bool,
    /// Only rows with these ids (`None` means no id filter).
    pub ids: Option<Vec<i32>>,
}

impl Selection {
    /// Every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Enabled rows only; what scheduled rounds use.
    pub fn enabled() -> Self {
        Selection {
            enabled_only: true,
            ids: None,
        }
    }

    /// Rows with the given ids regardless of enabled state. An empty list
    /// means "all", matching the dry-run CLI where no `-t`/`-s` was given.
    pub fn ids(ids: &[i32]) -> Self {
        Selection {
            enabled_only: false,
            ids: if ids.is_empty() { None } else { Some(ids.to_vec()) },
        }
    }

    pub fn matches(&self, id: i32, enabled: bool) -> bool {
        (!self.enabled_only || enabled) && self.ids.as_ref().map_or(true, |ids| ids.contains(&id))
    }
}

#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn teams(&self, selection: &Selection) -> Result<Vec<TeamRow>>;

    async fn services(&self, selection: &Selection) -> Result<Vec<ServiceRow>>;

    /// Configuration rows for every pair drawn from `team_ids × service_ids`.
    async fn team_service_rows(
        &self,
        team_ids: &[i32],
        service_ids: &[i32],
    ) -> Result<Vec<TeamServiceRow>>;

    /// Create an incomplete round. Fails if `number` already exists.
    async fn create_round(&self, number: i32) -> Result<()>;

    /// Atomically insert `checks` and mark round `number` completed at `finish`.
    /// On error nothing is written and the round stays incomplete.
    async fn complete_round(
        &self,
        number: i32,
        checks: &[NewCheck],
        finish: DateTime<Utc>,
    ) -> Result<()>;

    async fn max_round_number(&self) -> Result<Option<i32>>;

    /// Delete every check result and round.
    async fn reset_rounds(&self) -> Result<()>;

    async fn set_team_enabled(&self, id: i32, enabled: bool) -> Result<()>;

    async fn set_service_enabled(&self, id: i32, enabled: bool) -> Result<()>;

    async fn round(&self, number: i32) -> Result<Option<RoundRow>>;

    async fn checks_for_round(&self, number: i32) -> Result<Vec<CheckRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_selection_filters_disabled() {
        let s = Selection::enabled();
        assert!(s.matches(1, true));
        assert!(!s.matches(1, false));
    }

    #[test]
    fn id_selection_ignores_enabled_flag() {
        let s = Selection::ids(&[2, 3]);
        assert!(s.matches(2, false));
        assert!(s.matches(3, true));
        assert!(!s.matches(1, true));
    }

    #[test]
    fn empty_id_list_selects_everything() {
        let s = Selection::ids(&[]);
        assert_eq!(s, Selection::all());
        assert!(s.matches(99, false));
    }
}
