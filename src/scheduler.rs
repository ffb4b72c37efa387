//! # Scheduler — Round Timing and Traffic Generation
//!
//! Drives the exercise. [`Scheduler::run`] starts two independent loops:
//!
//! - **Scoring loop**: starts the dispatch cycle for official round `n`,
//!   sleeps `duration ± jitter` seconds (uniform), then moves to `n + 1`.
//! - **Traffic loop** (if `trafficgen.enabled`): starts an unofficial cycle
//!   of at most `trafficgen.number` random tasks every `trafficgen.sleep`
//!   seconds.
//!
//! Neither loop waits for the cycles it starts. Every cycle is spawned as
//! its own tokio task and tracked in the [`CycleRegistry`], so a slow round
//! can overlap the next one. A cycle is:
//!
//! ```text
//! create round (official only) → build tasks → dispatch → record (official only)
//! ```
//!
//! Cycle errors are logged and never stop the loops. On warm shutdown both
//! loops stop starting cycles, the registry is drained so in-flight rounds
//! persist, and the state becomes `Stopped`.

use crate::builder::{BuildOptions, TaskBuilder};
use crate::config::Config;
use crate::cycles::{CycleKind, CycleRegistry};
use crate::dispatch::Dispatcher;
use crate::recorder::ResultRecorder;
use crate::shutdown::Shutdown;
use crate::store::ScoreStore;
use crate::task::CheckTask;
use anyhow::Result;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

// ── Start round ─────────────────────────────────────────────────

/// How the scoring loop picks its first round number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartMode {
    /// Start at `max(persisted round) + 1`, or 1 on an empty store.
    Resume,
    /// Delete every round and check, then start at 1.
    Reset,
    /// Start at an explicit round number (>= 1).
    At(i32),
}

pub async fn resolve_start_round(store: &dyn ScoreStore, mode: StartMode) -> Result<i32> {
    match mode {
        StartMode::Resume => Ok(store.max_round_number().await?.map_or(1, |n| n + 1)),
        StartMode::Reset => {
            warn!("Deleting all rounds and checks");
            store.reset_rounds().await?;
            Ok(1)
        }
        StartMode::At(n) if n >= 1 => Ok(n),
        StartMode::At(n) => anyhow::bail!("start round must be >= 1, got {}", n),
    }
}

// ── Dispatch cycle ──────────────────────────────────────────────

/// Everything one dispatch cycle needs, shared by all cycles.
pub struct CycleEngine {
    store: Arc<dyn ScoreStore>,
    builder: TaskBuilder,
    dispatcher: Dispatcher,
    recorder: ResultRecorder,
}

impl CycleEngine {
    pub fn new(store: Arc<dyn ScoreStore>, dispatcher: Dispatcher, recorder: ResultRecorder) -> Self {
        CycleEngine {
            builder: TaskBuilder::new(Arc::clone(&store)),
            store,
            dispatcher,
            recorder,
        }
    }

    /// Run one cycle. `round` is `Some(n)` for official round `n`, `None`
    /// for traffic generation and dry runs.
    pub async fn run_cycle(&self, round: Option<i32>, options: &BuildOptions) -> Result<Vec<CheckTask>> {
        let started = Instant::now();
        if let Some(n) = round {
            self.store.create_round(n).await?;
        }

        let tasks = self.builder.build(round, options).await?;
        let total = tasks.len();
        let results = self.dispatcher.dispatch(tasks).await?;

        if let Some(n) = round {
            self.recorder.record(n, &results).await?;
            info!(
                round = n,
                tasks = total,
                passed = results.iter().filter(|t| t.passed).count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Round complete"
            );
        }
        Ok(results)
    }
}

// ── Scheduler ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct Scheduler {
    config: Arc<Config>,
    engine: Arc<CycleEngine>,
    cycles: Arc<CycleRegistry>,
    shutdown: Shutdown,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, engine: Arc<CycleEngine>, shutdown: Shutdown) -> Self {
        let cycles = Arc::new(CycleRegistry::new(config.scheduler.max_tracked_cycles));
        Scheduler {
            config,
            engine,
            cycles,
            shutdown,
        }
    }

    pub fn cycles(&self) -> &CycleRegistry {
        &self.cycles
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Run both loops until shutdown, then wait for in-flight cycles.
    pub async fn run(&self, start_round: i32) -> Result<()> {
        info!(
            start_round,
            duration = self.config.round.duration,
            jitter = self.config.round.jitter,
            trafficgen = self.config.trafficgen.enabled,
            backend = self.engine.dispatcher.backend_name(),
            "Scheduler starting"
        );

        let scoring = tokio::spawn({
            let this = self.clone();
            async move { this.scoring_loop(start_round).await }
        });
        let traffic = self.config.trafficgen.enabled.then(|| {
            let this = self.clone();
            tokio::spawn(async move { this.traffic_loop().await })
        });

        scoring.await?;
        if let Some(traffic) = traffic {
            traffic.await?;
        }

        let in_flight = self.cycles.in_flight().len() + self.cycles.overflowed();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight cycles to finish");
        }
        self.cycles.drain().await;
        self.shutdown.mark_stopped();
        info!("Scheduler stopped");
        Ok(())
    }

    async fn scoring_loop(&self, start_round: i32) {
        let mut round = start_round;
        while self.shutdown.is_running() {
            self.spawn_cycle(CycleKind::Official(round));

            let delay = round_delay(self.config.sleep_range(), &mut rand::rng());
            info!(round, next_in_secs = delay.as_secs(), "Round dispatched");
            round += 1;
            if !self.shutdown.sleep(delay).await {
                break;
            }
        }
        info!(next_round = round, "Scoring loop stopped");
    }

    async fn traffic_loop(&self) {
        let delay = Duration::from_secs(self.config.trafficgen.sleep);
        while self.shutdown.is_running() {
            self.spawn_cycle(CycleKind::Traffic);
            if !self.shutdown.sleep(delay).await {
                break;
            }
        }
        info!("Traffic loop stopped");
    }

    fn spawn_cycle(&self, kind: CycleKind) {
        let engine = Arc::clone(&self.engine);
        let (round, options) = match kind {
            CycleKind::Official(n) => (Some(n), BuildOptions::enabled()),
            CycleKind::Traffic => (
                None,
                BuildOptions::enabled().with_max_checks(Some(self.config.trafficgen.number)),
            ),
        };
        let handle = tokio::spawn(async move {
            if let Err(e) = engine.run_cycle(round, &options).await {
                error!(cycle = %kind, error = %e, "Dispatch cycle failed");
            }
        });
        self.cycles.track(kind, handle);
    }
}

/// Uniform draw from the inclusive `(low, high)` range, in seconds.
pub fn round_delay<R: Rng + ?Sized>((low, high): (u64, u64), rng: &mut R) -> Duration {
    Duration::from_secs(rng.random_range(low..=high.max(low)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn delay_stays_within_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = round_delay((50, 70), &mut rng).as_secs();
            assert!((50..=70).contains(&d), "delay {} out of range", d);
        }
        assert_eq!(round_delay((30, 30), &mut rng), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn resume_starts_after_highest_round() {
        let store = MemoryStore::new();
        assert_eq!(resolve_start_round(&store, StartMode::Resume).await.unwrap(), 1);
        store.create_round(1).await.unwrap();
        store.create_round(5).await.unwrap();
        assert_eq!(resolve_start_round(&store, StartMode::Resume).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn reset_clears_and_starts_at_one() {
        let store = MemoryStore::new();
        store.create_round(9).await.unwrap();
        assert_eq!(resolve_start_round(&store, StartMode::Reset).await.unwrap(), 1);
        assert!(store.rounds().is_empty());
    }

    #[tokio::test]
    async fn explicit_start_must_be_positive() {
        let store = MemoryStore::new();
        assert_eq!(resolve_start_round(&store, StartMode::At(12)).await.unwrap(), 12);
        assert!(resolve_start_round(&store, StartMode::At(0)).await.is_err());
    }
}
