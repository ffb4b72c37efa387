//! # Main — CLI Entry Point
//!
//! Parses the command line, initialises logging and routes subcommands to
//! the execution functions in `cli.rs`.
//!
//! ## Subcommands
//!
//! - `db` — schema bootstrap/seeding and team/service administration.
//! - `run` — start the round scheduler (local pool or Redis queue backend).
//! - `worker` — consume check tasks from the Redis queue.
//! - `check` — one-off dry run of selected checks; nothing is persisted.
//!
//! ## Global Options
//!
//! - `--config`: TOML configuration file (default `scoreengine.toml`).
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//!
//! `LOG_FORMAT=json` switches logs to JSON; `RUST_LOG` sets the filter.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scoreengine::dispatch::BackendKind;
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "scoreengine", about = "Score an attack/defense exercise by checking team services every round")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "scoreengine.toml")]
    config: PathBuf,

    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database administration
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Run the round scheduler until interrupted (Ctrl-C once to drain, twice to abort)
    Run {
        /// Where checks execute
        #[arg(long, value_enum, default_value_t = BackendKind::Local)]
        backend: BackendKind,
        /// Delete all previous rounds and checks, then start at round 1
        #[arg(long, conflicts_with_all = ["resume", "start_round"])]
        reset: bool,
        /// Continue after the highest recorded round
        #[arg(long, conflicts_with = "start_round")]
        resume: bool,
        /// First round number to dispatch
        #[arg(long, default_value_t = 1)]
        start_round: i32,
    },
    /// Consume check tasks from the Redis queue
    Worker,
    /// Run checks once and print the results without recording anything
    Check {
        /// Service id to check (repeatable; default: all services)
        #[arg(short = 's', long = "service")]
        services: Vec<i32>,
        /// Team id to check (repeatable; default: all teams)
        #[arg(short = 't', long = "team")]
        teams: Vec<i32>,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Drop and recreate all tables, then seed teams and services from the config
    Init,
    /// List teams
    ListTeams,
    /// List services
    ListServices,
    /// Enable a team
    EnableTeam {
        #[arg(long)]
        id: i32,
    },
    /// Disable a team (its recorded checks are kept)
    DisableTeam {
        #[arg(long)]
        id: i32,
    },
    /// Enable a service
    EnableService {
        #[arg(long)]
        id: i32,
    },
    /// Disable a service (its recorded checks are kept)
    DisableService {
        #[arg(long)]
        id: i32,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for log shipping, human-readable otherwise
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Db { action } => cli::run_db(&cli, action),
        Commands::Run {
            backend,
            reset,
            resume,
            start_round,
        } => {
            let mode = cli::start_mode(*reset, *resume, *start_round);
            cli::run_scheduler(&cli, *backend, mode)
        }
        Commands::Worker => cli::run_worker(&cli),
        Commands::Check { services, teams } => cli::run_check(&cli, teams, services),
    }
}
