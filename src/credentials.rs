//! # Credentials — Team/Service Configuration Resolution
//!
//! Team-service configuration is stored as `(key, value)` rows, and a key may
//! appear more than once: multiple `USERPASS` rows form a rotating credential
//! set. Each dispatch picks one value per key uniformly at random, so
//! consecutive rounds exercise different accounts.
//!
//! After selection, a `USERPASS` value of the form `user||pass` is split into
//! separate `USER` and `PASS` entries. Missing keys are not an error here;
//! the probe that needs them reports the problem.

use crate::task::CheckConfig;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Key holding a combined `user||pass` credential.
pub const USERPASS_KEY: &str = "USERPASS";
/// Separator between user and password inside a `USERPASS` value.
pub const USERPASS_DELIMITER: &str = "||";

/// Group rows by key, choose one value per key, then apply the `USERPASS` split.
pub fn resolve<I, K, V, R>(rows: I, rng: &mut R) -> CheckConfig
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
    R: Rng + ?Sized,
{
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in rows {
        grouped.entry(key.into()).or_default().push(value.into());
    }

    let mut config: CheckConfig = grouped
        .into_iter()
        .filter_map(|(key, values)| values.choose(rng).cloned().map(|value| (key, value)))
        .collect();

    split_userpass(&mut config);
    config
}

fn split_userpass(config: &mut CheckConfig) {
    let split = config
        .get(USERPASS_KEY)
        .and_then(|combined| combined.split_once(USERPASS_DELIMITER))
        .map(|(user, pass)| (user.to_string(), pass.to_string()));

    if let Some((user, pass)) = split {
        config.insert("USER".to_string(), user);
        config.insert("PASS".to_string(), pass);
    }
}
