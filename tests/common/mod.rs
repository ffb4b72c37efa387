//! Shared test helpers for integration tests.

#![allow(dead_code)]

use scoreengine::config::Config;
use scoreengine::db::Database;
use scoreengine::store::MemoryStore;
use scoreengine::task::CheckId;
use std::sync::Arc;

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Connect to the test database and recreate the schema from scratch.
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&test_db_url(), 4)
        .await
        .expect("Failed to connect to test database");
    db.init_schema().await.expect("Failed to create schema");
    db
}

/// Configuration with two teams (team 2 is the check team) and two services.
pub fn two_by_two_config() -> Config {
    Config::parse(
        r#"
        [round]
        duration = 10
        jitter = 2

        [trafficgen]
        number = 1
        sleep = 3

        [teams]
        minimum = 1
        maximum = 2

        [[services]]
        name = "Web"
        check = "test.pass"
        data = [
            { key = "HOST", value = "10.0.{team}.10" },
            { key = "PORT", value = "80" },
        ]

        [[services]]
        name = "SSH"
        check = "test.fail"
        data = [
            { key = "HOST", value = "10.0.{team}.22" },
            { key = "USERPASS", value = "root||toor" },
            { key = "USERPASS", value = "admin||hunter2", hidden = true },
        ]
        "#,
    )
    .expect("test config parses")
}

/// In-memory store with `teams` × `services`, every pair holding a HOST row.
pub fn memory_store(teams: usize, services: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let team_ids: Vec<i32> = (1..=teams)
        .map(|n| store.add_team(&format!("Team {}", n), n == teams))
        .collect();
    for s in 0..services {
        let service = store.add_service(&format!("Service {}", s), &CheckId::new("test", "pass"));
        for &team in &team_ids {
            store.add_config(team, service, "HOST", &format!("10.0.{}.{}", team, s));
        }
    }
    store
}

/// Returns the test Redis URL from the `TEST_REDIS_URL` environment variable.
pub fn test_redis_url() -> String {
    std::env::var("TEST_REDIS_URL").expect("TEST_REDIS_URL must be set for queue tests")
}

/// Returns true if a test Redis instance is configured.
pub fn has_test_redis() -> bool {
    std::env::var("TEST_REDIS_URL").is_ok()
}
