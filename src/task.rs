//! # Task — Check Task Description
//!
//! A [`CheckTask`] is the unit of work for one (team, service) pair in one
//! round. The same structure travels through every stage of a dispatch
//! cycle: the task builder creates it with `passed = false` and an empty
//! output log, a backend hands it to the check invoker, and the invoker
//! returns it augmented with `passed` and `output`. For the queue backend it
//! is serialized as JSON on the wire in both directions.
//!
//! ## Round identifiers
//!
//! A round is *official* iff its identifier is a positive integer. Traffic
//! generation and dry-run checks use [`UNOFFICIAL_ROUND`] and never produce
//! `rounds` or `checks` rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Round identifier used for traffic generation cycles and dry runs.
pub const UNOFFICIAL_ROUND: i32 = -1;

/// Returns true if `round` identifies an official (persisted) round.
pub fn is_official(round: i32) -> bool {
    round > 0
}

/// Resolved `key -> value` configuration handed to a single probe call.
pub type CheckConfig = BTreeMap<String, String>;

/// Identifies a probe by `(group, function)`, e.g. `http.check_http`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckId {
    pub group: String,
    pub function: String,
}

impl CheckId {
    pub fn new(group: impl Into<String>, function: impl Into<String>) -> Self {
        CheckId {
            group: group.into(),
            function: function.into(),
        }
    }

    /// Parse the `group.function` notation used in configuration files.
    pub fn parse(spec: &str) -> Option<Self> {
        let (group, function) = spec.split_once('.')?;
        if group.is_empty() || function.is_empty() {
            return None;
        }
        Some(CheckId::new(group, function))
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.function)
    }
}

/// One dispatchable check: what to run, against whom, for which round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckTask {
    /// Unique per task; lets the dispatcher account for every result exactly once.
    pub id: Uuid,
    pub check: CheckId,
    pub config: CheckConfig,
    pub official: bool,
    pub output: Vec<String>,
    pub passed: bool,
    pub round_number: i32,
    pub service_id: i32,
    pub service_name: String,
    pub team_id: i32,
    pub team_name: String,
}

impl CheckTask {
    pub fn new(
        check: CheckId,
        config: CheckConfig,
        round_number: i32,
        team: (i32, &str),
        service: (i32, &str),
    ) -> Self {
        CheckTask {
            id: Uuid::new_v4(),
            check,
            config,
            official: is_official(round_number),
            output: Vec::new(),
            passed: false,
            round_number,
            service_id: service.0,
            service_name: service.1.to_string(),
            team_id: team.0,
            team_name: team.1.to_string(),
        }
    }

    /// The output log joined into the text stored on a `checks` row.
    pub fn output_text(&self) -> String {
        self.output.join("\n")
    }
}
