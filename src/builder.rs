//! # Builder — Round Task Construction
//!
//! Enumerates every (team, service) pair for a round, resolves each pair's
//! configuration through [`credentials::resolve`], and returns the tasks in
//! a uniformly shuffled order so consecutive rounds do not always probe the
//! same service first. An optional cap truncates the shuffled list, which is
//! how traffic generation draws a small random sample.

use crate::credentials;
use crate::store::{ScoreStore, Selection};
use crate::task::{CheckTask, UNOFFICIAL_ROUND};
use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Which pairs to enumerate and how many tasks to keep.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub teams: Selection,
    pub services: Selection,
    pub max_checks: Option<usize>,
}

impl BuildOptions {
    /// Enabled teams × enabled services, no cap.
    pub fn enabled() -> Self {
        BuildOptions {
            teams: Selection::enabled(),
            services: Selection::enabled(),
            max_checks: None,
        }
    }

    pub fn with_max_checks(mut self, max_checks: Option<usize>) -> Self {
        self.max_checks = max_checks;
        self
    }
}

pub struct TaskBuilder {
    store: Arc<dyn ScoreStore>,
}

impl TaskBuilder {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        TaskBuilder { store }
    }

    /// Build the tasks for `round` (`None` for traffic generation / dry runs).
    pub async fn build(&self, round: Option<i32>, options: &BuildOptions) -> Result<Vec<CheckTask>> {
        let teams = self.store.teams(&options.teams).await?;
        let services = self.store.services(&options.services).await?;

        let team_ids: Vec<i32> = teams.iter().map(|t| t.id).collect();
        let service_ids: Vec<i32> = services.iter().map(|s| s.id).collect();
        let rows = if team_ids.is_empty() || service_ids.is_empty() {
            Vec::new()
        } else {
            self.store.team_service_rows(&team_ids, &service_ids).await?
        };

        let mut by_pair: HashMap<(i32, i32), Vec<(String, String)>> = HashMap::new();
        for row in rows {
            by_pair
                .entry((row.team_id, row.service_id))
                .or_default()
                .push((row.key, row.value));
        }

        let round_number = round.unwrap_or(UNOFFICIAL_ROUND);
        let mut rng = rand::rng();
        let mut tasks = Vec::with_capacity(teams.len() * services.len());
        for team in &teams {
            for service in &services {
                let rows = by_pair.remove(&(team.id, service.id)).unwrap_or_default();
                tasks.push(CheckTask::new(
                    service.check_id(),
                    credentials::resolve(rows, &mut rng),
                    round_number,
                    (team.id, &team.name),
                    (service.id, &service.name),
                ));
            }
        }

        Ok(shuffle_and_cap(tasks, options.max_checks, &mut rng))
    }
}

/// Uniformly permute `tasks`, then keep at most `max_checks` of them.
pub fn shuffle_and_cap<T, R: Rng + ?Sized>(
    mut tasks: Vec<T>,
    max_checks: Option<usize>,
    rng: &mut R,
) -> Vec<T> {
    tasks.shuffle(rng);
    if let Some(cap) = max_checks {
        tasks.truncate(cap);
    }
    tasks
}
