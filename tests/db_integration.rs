//! Database integration tests.
//!
//! All tests require TEST_DATABASE_URL to be set.
//! Run with: TEST_DATABASE_URL=postgres://... cargo test --test db_integration
//!
//! Every test recreates the schema, so run them single-threaded:
//!   cargo test --test db_integration -- --test-threads=1

mod common;

use chrono::Utc;
use scoreengine::builder::{BuildOptions, TaskBuilder};
use scoreengine::db::{Database, NewCheck};
use scoreengine::store::{ScoreStore, Selection};
use std::sync::Arc;

/// Skip the test if TEST_DATABASE_URL is not set.
macro_rules! require_db {
    () => {
        if !common::has_test_db() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

async fn setup() -> Database {
    common::setup_test_db().await
}

async fn seeded() -> Database {
    let db = setup().await;
    db.init_from_config(&common::two_by_two_config()).await.unwrap();
    db
}

fn check(team_id: i32, service_id: i32, round: i32, passed: bool) -> NewCheck {
    NewCheck {
        team_id,
        service_id,
        round,
        passed,
        output: format!("checked {} {}", team_id, service_id),
    }
}

// --- Seeding ---

#[tokio::test]
async fn init_seeds_teams_services_and_rows() {
    require_db!();
    let db = setup().await;
    let summary = db.init_from_config(&common::two_by_two_config()).await.unwrap();
    assert_eq!(summary.teams, 2);
    assert_eq!(summary.services, 2);
    // Web has 2 data rows, SSH has 3; both for each of 2 teams.
    assert_eq!(summary.team_service_rows, 10);

    let teams = db.teams(&Selection::all()).await.unwrap();
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0].name, "Team 1");
    assert!(!teams[0].check_team);
    assert!(teams[1].check_team);
}

#[tokio::test]
async fn team_service_rows_keep_order_and_substitution() {
    require_db!();
    let db = seeded().await;
    let teams = db.teams(&Selection::all()).await.unwrap();
    let services = db.services(&Selection::all()).await.unwrap();
    let ssh = services.iter().find(|s| s.name == "SSH").unwrap();

    let rows = db
        .team_service_rows(&[teams[1].id], &[ssh.id])
        .await
        .unwrap();
    let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["HOST", "USERPASS", "USERPASS"]);
    assert_eq!(rows[0].value, "10.0.2.22");
    assert!(rows[2].hidden);
    assert!(rows.iter().all(|r| r.edit));
}

// --- Rounds ---

#[tokio::test]
async fn round_numbers_are_unique() {
    require_db!();
    let db = seeded().await;
    db.create_round(1).await.unwrap();
    assert!(db.create_round(1).await.is_err());
    assert_eq!(db.max_round_number().await.unwrap(), Some(1));
}

#[tokio::test]
async fn complete_round_writes_checks_atomically() {
    require_db!();
    let db = seeded().await;
    let teams = db.teams(&Selection::all()).await.unwrap();
    let services = db.services(&Selection::all()).await.unwrap();

    db.create_round(1).await.unwrap();
    let checks: Vec<NewCheck> = teams
        .iter()
        .flat_map(|t| services.iter().map(move |s| check(t.id, s.id, 1, true)))
        .collect();
    db.complete_round(1, &checks, Utc::now()).await.unwrap();

    let round = db.round(1).await.unwrap().unwrap();
    assert!(round.completed);
    assert!(round.finish.is_some());
    assert_eq!(db.checks_for_round(1).await.unwrap().len(), 4);
    assert_eq!(db.count_checks().await.unwrap(), 4);
}

#[tokio::test]
async fn duplicate_check_rolls_back_whole_round() {
    require_db!();
    let db = seeded().await;
    let teams = db.teams(&Selection::all()).await.unwrap();
    let services = db.services(&Selection::all()).await.unwrap();

    db.create_round(2).await.unwrap();
    let dup = check(teams[0].id, services[0].id, 2, true);
    let err = db
        .complete_round(2, &[dup.clone(), dup], Utc::now())
        .await;
    assert!(err.is_err());

    assert!(db.checks_for_round(2).await.unwrap().is_empty());
    assert!(!db.round(2).await.unwrap().unwrap().completed);
}

#[tokio::test]
async fn completing_missing_round_fails_without_writes() {
    require_db!();
    let db = seeded().await;
    let teams = db.teams(&Selection::all()).await.unwrap();
    let services = db.services(&Selection::all()).await.unwrap();
    let result = db
        .complete_round(7, &[check(teams[0].id, services[0].id, 7, true)], Utc::now())
        .await;
    assert!(result.is_err());
    assert_eq!(db.count_checks().await.unwrap(), 0);
}

#[tokio::test]
async fn reset_removes_rounds_and_checks() {
    require_db!();
    let db = seeded().await;
    let teams = db.teams(&Selection::all()).await.unwrap();
    let services = db.services(&Selection::all()).await.unwrap();
    db.create_round(1).await.unwrap();
    db.complete_round(1, &[check(teams[0].id, services[0].id, 1, false)], Utc::now())
        .await
        .unwrap();

    db.reset_rounds().await.unwrap();
    assert_eq!(db.max_round_number().await.unwrap(), None);
    assert_eq!(db.count_checks().await.unwrap(), 0);
    assert!(db.get_rounds().await.unwrap().is_empty());
}

// --- Enable / disable ---

#[tokio::test]
async fn disabled_team_keeps_history_but_leaves_enumeration() {
    require_db!();
    let db = seeded().await;
    let teams = db.teams(&Selection::all()).await.unwrap();
    let services = db.services(&Selection::all()).await.unwrap();
    db.create_round(1).await.unwrap();
    db.complete_round(1, &[check(teams[0].id, services[0].id, 1, true)], Utc::now())
        .await
        .unwrap();

    db.set_team_enabled(teams[0].id, false).await.unwrap();
    let enabled = db.teams(&Selection::enabled()).await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id, teams[1].id);
    assert_eq!(db.checks_for_round(1).await.unwrap().len(), 1);

    let store: Arc<dyn ScoreStore> = Arc::new(db.clone());
    let tasks = TaskBuilder::new(store)
        .build(Some(2), &BuildOptions::enabled())
        .await
        .unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.team_id == teams[1].id));
}

#[tokio::test]
async fn enabling_unknown_ids_fails() {
    require_db!();
    let db = seeded().await;
    assert!(db.set_team_enabled(9999, false).await.is_err());
    assert!(db.set_service_enabled(9999, false).await.is_err());
}

#[tokio::test]
async fn selection_by_ids_includes_disabled() {
    require_db!();
    let db = seeded().await;
    let services = db.services(&Selection::all()).await.unwrap();
    db.set_service_enabled(services[1].id, false).await.unwrap();

    let picked = db.services(&Selection::ids(&[services[1].id])).await.unwrap();
    assert_eq!(picked.len(), 1);
    assert!(!picked[0].enabled);
    assert_eq!(db.services(&Selection::enabled()).await.unwrap().len(), 1);
}

// --- Task building against PostgreSQL ---

#[tokio::test]
async fn builder_resolves_userpass_from_db_rows() {
    require_db!();
    let db = seeded().await;
    let store: Arc<dyn ScoreStore> = Arc::new(db);
    let tasks = TaskBuilder::new(store)
        .build(Some(1), &BuildOptions::enabled())
        .await
        .unwrap();
    assert_eq!(tasks.len(), 4);

    for task in tasks.iter().filter(|t| t.service_name == "SSH") {
        let user = task.config.get("USER").unwrap();
        let pass = task.config.get("PASS").unwrap();
        assert!(
            (user == "root" && pass == "toor") || (user == "admin" && pass == "hunter2"),
            "unexpected pair {}/{}",
            user,
            pass
        );
    }
}
