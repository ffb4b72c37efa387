//! # Recorder — Official Round Persistence
//!
//! Turns a completed round's results into `checks` rows and marks the round
//! completed, all inside one store transaction. Unofficial results (traffic
//! generation, dry runs) are discarded without touching the store.
//!
//! The bank webhook fires only after the commit succeeded, so a rolled-back
//! round never pays out.

use crate::bank::BankNotifier;
use crate::db::NewCheck;
use crate::store::ScoreStore;
use crate::task::{is_official, CheckTask};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct ResultRecorder {
    store: Arc<dyn ScoreStore>,
    bank: Option<BankNotifier>,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn ScoreStore>, bank: Option<BankNotifier>) -> Self {
        ResultRecorder { store, bank }
    }

    /// Persist `results` for `round`. Returns the number of rows written.
    pub async fn record(&self, round: i32, results: &[CheckTask]) -> Result<usize> {
        if !is_official(round) {
            return Ok(0);
        }

        let checks: Vec<NewCheck> = results
            .iter()
            .filter(|t| t.official)
            .map(|t| NewCheck {
                team_id: t.team_id,
                service_id: t.service_id,
                round,
                passed: t.passed,
                output: t.output_text(),
            })
            .collect();

        self.store.complete_round(round, &checks, Utc::now()).await?;

        let passed = checks.iter().filter(|c| c.passed).count();
        info!(round, checks = checks.len(), passed, "Round recorded");

        if let Some(bank) = &self.bank {
            bank.notify(results);
        }
        Ok(checks.len())
    }
}
