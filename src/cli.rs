//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Each subcommand
//! loads the configuration, builds a tokio runtime and wires the engine
//! together: database, probe registry, dispatcher, recorder, scheduler.

use anyhow::Result;
use scoreengine::bank::BankNotifier;
use scoreengine::builder::{BuildOptions, TaskBuilder};
use scoreengine::config::Config;
use scoreengine::db::Database;
use scoreengine::dispatch::{BackendKind, Dispatcher};
use scoreengine::invoker::ProbeRegistry;
use scoreengine::recorder::ResultRecorder;
use scoreengine::scheduler::{self, CycleEngine, Scheduler, StartMode};
use scoreengine::shutdown::{self, Shutdown};
use scoreengine::store::{ScoreStore, Selection};
use scoreengine::worker::QueueWorker;
use std::sync::Arc;
use tracing::{error, info};

use super::{Cli, DbAction};

// ── Shared setup ────────────────────────────────────────────────

fn load_config(cli: &Cli) -> Result<Arc<Config>> {
    let config = Config::load(&cli.config)?;
    Ok(Arc::new(config))
}

fn database_url(cli: &Cli) -> Result<&str> {
    cli.database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)"))
}

async fn connect(cli: &Cli, config: &Config) -> Result<Database> {
    // One connection per concurrently running cycle stage is plenty; the
    // pool never holds a connection across a dispatch fan-out.
    let max_connections = (config.scheduler.max_tracked_cycles as u32).clamp(2, 16);
    Database::connect(database_url(cli)?, max_connections).await
}

pub fn start_mode(reset: bool, resume: bool, start_round: i32) -> StartMode {
    if reset {
        StartMode::Reset
    } else if resume {
        StartMode::Resume
    } else {
        StartMode::At(start_round)
    }
}

// ── db ──────────────────────────────────────────────────────────

pub fn run_db(cli: &Cli, action: &DbAction) -> Result<()> {
    let config = load_config(cli)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = connect(cli, &config).await?;
        match action {
            DbAction::Init => {
                let summary = db.init_from_config(&config).await?;
                info!(
                    teams = summary.teams,
                    services = summary.services,
                    team_service_rows = summary.team_service_rows,
                    "Database initialised"
                );
            }
            DbAction::ListTeams => {
                for team in db.teams(&Selection::all()).await? {
                    println!(
                        "{:>4}  {:<20} {:<8} {}",
                        team.id,
                        team.name,
                        if team.enabled { "enabled" } else { "disabled" },
                        if team.check_team { "check team" } else { "" }
                    );
                }
            }
            DbAction::ListServices => {
                for service in db.services(&Selection::all()).await? {
                    println!(
                        "{:>4}  {:<20} {:<24} {}",
                        service.id,
                        service.name,
                        service.check_id(),
                        if service.enabled { "enabled" } else { "disabled" }
                    );
                }
            }
            DbAction::EnableTeam { id } => set_team(&db, *id, true).await?,
            DbAction::DisableTeam { id } => set_team(&db, *id, false).await?,
            DbAction::EnableService { id } => set_service(&db, *id, true).await?,
            DbAction::DisableService { id } => set_service(&db, *id, false).await?,
        }
        Ok(())
    })
}

async fn set_team(db: &Database, id: i32, enabled: bool) -> Result<()> {
    db.set_team_enabled(id, enabled).await?;
    info!(team = id, enabled, "Team updated");
    Ok(())
}

async fn set_service(db: &Database, id: i32, enabled: bool) -> Result<()> {
    db.set_service_enabled(id, enabled).await?;
    info!(service = id, enabled, "Service updated");
    Ok(())
}

// ── run ─────────────────────────────────────────────────────────

pub fn run_scheduler(cli: &Cli, backend: BackendKind, mode: StartMode) -> Result<()> {
    let config = load_config(cli)?;
    let registry = Arc::new(ProbeRegistry::with_builtin(&config.checks));
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let db = connect(cli, &config).await?;
        db.health_check().await?;
        let store: Arc<dyn ScoreStore> = Arc::new(db);

        for service in store.services(&Selection::enabled()).await? {
            let check = service.check_id();
            if backend == BackendKind::Local && !registry.contains(&check) {
                error!(service = %service.name, check = %check, "No probe registered; its rounds will abort");
            }
        }

        let start_round = scheduler::resolve_start_round(store.as_ref(), mode).await?;
        let dispatcher = Dispatcher::from_config(backend, &config, registry)?;
        let recorder = ResultRecorder::new(Arc::clone(&store), BankNotifier::from_config(&config.bank)?);
        let engine = Arc::new(CycleEngine::new(store, dispatcher, recorder));

        let shutdown = Shutdown::new();
        tokio::spawn(shutdown::listen_for_signals(shutdown.clone()));

        Scheduler::new(Arc::clone(&config), engine, shutdown)
            .run(start_round)
            .await
    })
}

// ── worker ──────────────────────────────────────────────────────

pub fn run_worker(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let registry = Arc::new(ProbeRegistry::with_builtin(&config.checks));
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let shutdown = Shutdown::new();
        tokio::spawn(shutdown::listen_for_signals(shutdown.clone()));
        QueueWorker::new(config, registry, shutdown).run().await
    })
}

// ── check ───────────────────────────────────────────────────────

pub fn run_check(cli: &Cli, teams: &[i32], services: &[i32]) -> Result<()> {
    let config = load_config(cli)?;
    let registry = Arc::new(ProbeRegistry::with_builtin(&config.checks));
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let store: Arc<dyn ScoreStore> = Arc::new(connect(cli, &config).await?);
        let options = BuildOptions {
            teams: Selection::ids(teams),
            services: Selection::ids(services),
            max_checks: None,
        };
        let tasks = TaskBuilder::new(store).build(None, &options).await?;
        info!(tasks = tasks.len(), "Running dry-run checks");

        let dispatcher = Dispatcher::from_config(BackendKind::Local, &config, registry)?;
        let results = dispatcher.dispatch(tasks).await?;
        println!("{}", serde_json::to_string_pretty(&results)?);
        Ok(())
    })
}
