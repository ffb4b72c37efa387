//! In-process [`ScoreStore`] with the same semantics as the PostgreSQL store:
//! unique round numbers, all-or-nothing round completion, and unique
//! `(team, service, round)` check rows.

use super::{ScoreStore, Selection};
use crate::db::{CheckRow, NewCheck, RoundRow, ServiceRow, TeamRow, TeamServiceRow};
use crate::task::CheckId;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    teams: Vec<TeamRow>,
    services: Vec<ServiceRow>,
    team_services: Vec<TeamServiceRow>,
    rounds: BTreeMap<i32, RoundRow>,
    checks: Vec<CheckRow>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_next_completion: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-update; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_team(&self, name: &str, check_team: bool) -> i32 {
        let mut state = self.lock();
        let id = state.next_id();
        state.teams.push(TeamRow {
            id,
            name: name.to_string(),
            enabled: true,
            check_team,
        });
        id
    }

    pub fn add_service(&self, name: &str, check: &CheckId) -> i32 {
        let mut state = self.lock();
        let id = state.next_id();
        state.services.push(ServiceRow {
            id,
            name: name.to_string(),
            check_group: check.group.clone(),
            check_function: check.function.clone(),
            enabled: true,
        });
        id
    }

    pub fn add_config(&self, team_id: i32, service_id: i32, key: &str, value: &str) {
        let mut state = self.lock();
        let sort_order = state
            .team_services
            .iter()
            .filter(|r| r.team_id == team_id && r.service_id == service_id)
            .count() as i32;
        state.team_services.push(TeamServiceRow {
            team_id,
            service_id,
            key: key.to_string(),
            value: value.to_string(),
            edit: true,
            hidden: false,
            sort_order,
        });
    }

    /// Make the next `complete_round` fail as if the commit had been rejected.
    pub fn fail_next_completion(&self) {
        self.fail_next_completion.store(true, Ordering::SeqCst);
    }

    pub fn rounds(&self) -> Vec<RoundRow> {
        self.lock().rounds.values().cloned().collect()
    }

    pub fn checks(&self) -> Vec<CheckRow> {
        self.lock().checks.clone()
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn teams(&self, selection: &Selection) -> Result<Vec<TeamRow>> {
        Ok(self
            .lock()
            .teams
            .iter()
            .filter(|t| selection.matches(t.id, t.enabled))
            .cloned()
            .collect())
    }

    async fn services(&self, selection: &Selection) -> Result<Vec<ServiceRow>> {
        Ok(self
            .lock()
            .services
            .iter()
            .filter(|s| selection.matches(s.id, s.enabled))
            .cloned()
            .collect())
    }

    async fn team_service_rows(
        &self,
        team_ids: &[i32],
        service_ids: &[i32],
    ) -> Result<Vec<TeamServiceRow>> {
        Ok(self
            .lock()
            .team_services
            .iter()
            .filter(|r| team_ids.contains(&r.team_id) && service_ids.contains(&r.service_id))
            .cloned()
            .collect())
    }

    async fn create_round(&self, number: i32) -> Result<()> {
        let mut state = self.lock();
        if state.rounds.contains_key(&number) {
            anyhow::bail!("round {} already exists", number);
        }
        let id = state.next_id();
        state.rounds.insert(
            number,
            RoundRow {
                id,
                number,
                completed: false,
                start: Utc::now(),
                finish: None,
            },
        );
        Ok(())
    }

    async fn complete_round(
        &self,
        number: i32,
        checks: &[NewCheck],
        finish: DateTime<Utc>,
    ) -> Result<()> {
        if self.fail_next_completion.swap(false, Ordering::SeqCst) {
            anyhow::bail!("simulated commit failure for round {}", number);
        }

        let mut state = self.lock();
        if !state.rounds.contains_key(&number) {
            anyhow::bail!("round {} does not exist", number);
        }

        // Validate everything before writing anything.
        let mut seen = std::collections::HashSet::new();
        for check in checks {
            let key = (check.team_id, check.service_id, check.round);
            let duplicate = !seen.insert(key)
                || state
                    .checks
                    .iter()
                    .any(|c| (c.team_id, c.service_id, c.round) == key);
            if duplicate {
                anyhow::bail!(
                    "duplicate check for team {} service {} round {}",
                    check.team_id,
                    check.service_id,
                    check.round
                );
            }
        }

        for check in checks {
            let id = state.next_id();
            state.checks.push(CheckRow {
                id,
                team_id: check.team_id,
                service_id: check.service_id,
                round: check.round,
                time: finish,
                passed: check.passed,
                output: check.output.clone(),
            });
        }
        if let Some(round) = state.rounds.get_mut(&number) {
            round.completed = true;
            round.finish = Some(finish);
        }
        Ok(())
    }

    async fn max_round_number(&self) -> Result<Option<i32>> {
        Ok(self.lock().rounds.keys().next_back().copied())
    }

    async fn reset_rounds(&self) -> Result<()> {
        let mut state = self.lock();
        state.checks.clear();
        state.rounds.clear();
        Ok(())
    }

    async fn set_team_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        let mut state = self.lock();
        let team = state
            .teams
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow::anyhow!("no team with id {}", id))?;
        team.enabled = enabled;
        Ok(())
    }

    async fn set_service_enabled(&self, id: i32, enabled: bool) -> Result<()> {
        let mut state = self.lock();
        let service = state
            .services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow::anyhow!("no service with id {}", id))?;
        service.enabled = enabled;
        Ok(())
    }

    async fn round(&self, number: i32) -> Result<Option<RoundRow>> {
        Ok(self.lock().rounds.get(&number).cloned())
    }

    async fn checks_for_round(&self, number: i32) -> Result<Vec<CheckRow>> {
        Ok(self
            .lock()
            .checks
            .iter()
            .filter(|c| c.round == number)
            .cloned()
            .collect())
    }
}
