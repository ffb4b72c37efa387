//! # Dispatch — Fan-out/Fan-in of Check Tasks
//!
//! The [`Dispatcher`] executes a round's tasks concurrently on one of two
//! interchangeable [`ExecutionBackend`]s and blocks until a result has come
//! back for every task:
//!
//! - [`local::LocalBackend`] — an in-process rayon pool sized by
//!   `worker.concurrency`; no infrastructure needed, no per-task time limit
//!   beyond the probes' own network timeouts.
//! - [`queue::QueueBackend`] — tasks are pushed to a Redis list consumed by
//!   `scoreengine worker` processes, which enforce `worker.soft_time_limit`
//!   and push results to a per-group reply list.
//!
//! Completion order is never guaranteed. The dispatcher matches results to
//! submitted tasks by id and refuses to return a partial set: a missing
//! result is [`DispatchError::Incomplete`]. Probe failures are data (the
//! invoker turned them into `passed = false`); only check-lookup failures
//! and infrastructure failures surface as errors, and they abort the round.

pub mod local;
pub mod queue;

use crate::config::Config;
use crate::invoker::ProbeRegistry;
use crate::task::CheckTask;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown check {group}.{function}")]
    UnknownCheck { group: String, function: String },
    #[error("execution backend failed: {0}")]
    Backend(String),
    #[error("backend returned {received} of {expected} results")]
    Incomplete { expected: usize, received: usize },
    #[error("malformed task payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for DispatchError {
    fn from(e: redis::RedisError) -> Self {
        DispatchError::Backend(e.to_string())
    }
}

/// Which backend executes a round's checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Bounded in-process worker pool.
    Local,
    /// Redis task queue consumed by `scoreengine worker` processes.
    Queue,
}

/// Executes a batch of tasks and returns every one of them completed.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, tasks: Vec<CheckTask>) -> Result<Vec<CheckTask>, DispatchError>;
}

pub struct Dispatcher {
    backend: Arc<dyn ExecutionBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Dispatcher { backend }
    }

    /// Build the dispatcher for `kind` from configuration.
    pub fn from_config(
        kind: BackendKind,
        config: &Config,
        registry: Arc<ProbeRegistry>,
    ) -> Result<Self, DispatchError> {
        let backend: Arc<dyn ExecutionBackend> = match kind {
            BackendKind::Local => Arc::new(local::LocalBackend::new(registry, config.worker.concurrency)?),
            BackendKind::Queue => Arc::new(queue::QueueBackend::new(&config.queue)?),
        };
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Execute `tasks` and return exactly one completed task per submitted task.
    pub async fn dispatch(&self, tasks: Vec<CheckTask>) -> Result<Vec<CheckTask>, DispatchError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        let submitted: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let results = self.backend.execute(tasks).await?;
        let results = match_results(&submitted, results)?;

        for result in &results {
            info!(
                round = result.round_number,
                team = %result.team_name,
                service = %result.service_name,
                "Check {}",
                if result.passed { "passed" } else { "failed" }
            );
        }
        Ok(results)
    }
}

/// Keep exactly one result per submitted id, in submission order. Duplicates
/// and results for ids that were never submitted are dropped.
pub fn match_results(
    submitted: &[Uuid],
    results: Vec<CheckTask>,
) -> Result<Vec<CheckTask>, DispatchError> {
    let mut by_id: HashMap<Uuid, CheckTask> = HashMap::with_capacity(results.len());
    for result in results {
        by_id.entry(result.id).or_insert(result);
    }

    let mut matched = Vec::with_capacity(submitted.len());
    for id in submitted {
        if let Some(result) = by_id.remove(id) {
            matched.push(result);
        }
    }
    if matched.len() != submitted.len() {
        return Err(DispatchError::Incomplete {
            expected: submitted.len(),
            received: matched.len(),
        });
    }
    Ok(matched)
}
