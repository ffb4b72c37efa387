//! Property-based tests for the scoring pipeline's pure building blocks.
//!
//! These tests use the `proptest` framework to check invariants across
//! randomly generated inputs rather than a handful of fixed examples.
//!
//! # Prerequisites
//!
//! - No database or network access required.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test property_tests
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! # Testing strategy
//!
//! - **Credential resolution**: every resolved value is drawn from that key's
//!   value set; `USERPASS` splits on the first `||`.
//! - **Task shuffling**: shuffle-then-cap is a permutation truncated to the cap.
//! - **Dispatch matching**: exactly one result per submitted task survives
//!   arbitrary duplication and reordering.
//! - **Round delay**: always within `[duration - jitter, duration + jitter]`.
//!
//! Each property is named `prop_<function>_<invariant>`.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scoreengine::builder::shuffle_and_cap;
use scoreengine::config::Config;
use scoreengine::credentials;
use scoreengine::dispatch::match_results;
use scoreengine::scheduler::round_delay;
use scoreengine::task::{CheckConfig, CheckId, CheckTask};
use std::collections::BTreeMap;
use uuid::Uuid;

fn key_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["HOST", "PORT", "USER", "PASS", "PATH", "EXPECTED"])
        .prop_map(str::to_string)
}

// == Credential resolution ====================================================

proptest! {
    #[test]
    fn prop_resolve_picks_member_of_value_set(
        rows in prop::collection::vec((key_strategy(), "[a-z0-9.]{1,12}"), 0..30),
        seed in any::<u64>(),
    ) {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in &rows {
            values.entry(k.clone()).or_default().push(v.clone());
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let config = credentials::resolve(rows.clone(), &mut rng);

        prop_assert_eq!(config.len(), values.len());
        for (key, value) in &config {
            prop_assert!(values[key].contains(value), "{}={} not in {:?}", key, value, values[key]);
        }
    }

    #[test]
    fn prop_userpass_splits_on_first_delimiter(
        user in "[a-z]{1,10}",
        pass in "[A-Za-z0-9|]{0,12}",
        seed in any::<u64>(),
    ) {
        let combined = format!("{}||{}", user, pass);
        let mut rng = StdRng::seed_from_u64(seed);
        let config = credentials::resolve(vec![("USERPASS", combined.as_str())], &mut rng);

        prop_assert_eq!(config.get("USER").map(String::as_str), Some(user.as_str()));
        prop_assert_eq!(config.get("PASS").map(String::as_str), Some(pass.as_str()));
    }

    #[test]
    fn prop_userpass_without_delimiter_adds_nothing(
        value in "[a-z0-9]{0,16}",
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = credentials::resolve(vec![("USERPASS", value.as_str())], &mut rng);
        prop_assert!(!config.contains_key("USER"));
        prop_assert!(!config.contains_key("PASS"));
    }
}

// == Task shuffling ===========================================================

proptest! {
    #[test]
    fn prop_shuffle_and_cap_is_truncated_permutation(
        len in 0usize..60,
        cap in prop::option::of(0usize..80),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let out = shuffle_and_cap((0..len).collect::<Vec<_>>(), cap, &mut rng);

        prop_assert_eq!(out.len(), cap.map_or(len, |c| c.min(len)));
        let mut sorted = out.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), out.len());
        prop_assert!(out.iter().all(|&x| x < len));
    }
}

// == Dispatch matching ========================================================

fn task(n: i32) -> CheckTask {
    CheckTask::new(CheckId::new("test", "pass"), CheckConfig::new(), 1, (n, "team"), (1, "svc"))
}

proptest! {
    #[test]
    fn prop_match_results_keeps_one_per_submitted_task(
        count in 1usize..20,
        duplicates in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        foreign in 0usize..5,
        seed in any::<u64>(),
    ) {
        let tasks: Vec<CheckTask> = (0..count as i32).map(task).collect();
        let submitted: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();

        let mut returned = tasks.clone();
        for idx in &duplicates {
            returned.push(tasks[idx.index(count)].clone());
        }
        returned.extend((0..foreign as i32).map(task));
        let mut rng = StdRng::seed_from_u64(seed);
        returned = shuffle_and_cap(returned, None, &mut rng);

        let matched = match_results(&submitted, returned).unwrap();
        let ids: Vec<Uuid> = matched.iter().map(|t| t.id).collect();
        prop_assert_eq!(ids, submitted);
    }

    #[test]
    fn prop_match_results_detects_missing(
        count in 2usize..20,
        missing in any::<prop::sample::Index>(),
    ) {
        let tasks: Vec<CheckTask> = (0..count as i32).map(task).collect();
        let submitted: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let mut returned = tasks;
        returned.remove(missing.index(count));
        prop_assert!(match_results(&submitted, returned).is_err());
    }
}

// == Round delay ==============================================================

proptest! {
    #[test]
    fn prop_round_delay_within_jitter(
        duration in 1u64..3600,
        jitter_frac in 0.0f64..=1.0,
        seed in any::<u64>(),
    ) {
        let jitter = (duration as f64 * jitter_frac) as u64;
        let mut config = Config::default();
        config.round.duration = duration;
        config.round.jitter = jitter;

        let mut rng = StdRng::seed_from_u64(seed);
        let delay = round_delay(config.sleep_range(), &mut rng).as_secs();
        prop_assert!(delay >= duration - jitter && delay <= duration + jitter);
    }
}
