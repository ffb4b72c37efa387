//! # Queue Backend — Redis Task Queue
//!
//! Distributed execution through a Redis list shared with any number of
//! `scoreengine worker` processes.
//!
//! ## Wire protocol
//!
//! - The dispatcher `RPUSH`es one [`TaskEnvelope`] (JSON) per task onto the
//!   queue list (`queue.name`). Every envelope of one dispatch carries the
//!   same `reply_to` key, `scoreengine:group:<uuid>:results`.
//! - A worker `BLPOP`s an envelope, runs the check under its soft time limit
//!   and `RPUSH`es a [`ResultEnvelope`] onto `reply_to`, refreshing the key's
//!   TTL so abandoned groups expire.
//! - The dispatcher `BLPOP`s `reply_to` in short polls until every submitted
//!   task id has been accounted for exactly once, then deletes the key.
//!
//! Redelivered or duplicated results are ignored; results for ids this group
//! never submitted are ignored. There is no overall deadline: a round waits
//! for its slowest check, which the worker's soft limit bounds.

use super::{DispatchError, ExecutionBackend};
use crate::config::QueueConfig;
use crate::task::CheckTask;
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Seconds a reply list survives after the last result was pushed.
pub const RESULT_TTL_SECS: i64 = 3600;

/// Seconds per `BLPOP` poll while waiting for results.
const POLL_SECS: f64 = 5.0;

/// A task on its way to a worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task: CheckTask,
    pub reply_to: String,
}

/// A worker's answer for one task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultEnvelope {
    /// The check ran; `task` carries `passed` and `output`.
    Done { task: CheckTask },
    /// The worker has no probe registered for the task's check.
    UnknownCheck {
        task_id: Uuid,
        group: String,
        function: String,
    },
}

impl ResultEnvelope {
    pub fn task_id(&self) -> Uuid {
        match self {
            ResultEnvelope::Done { task } => task.id,
            ResultEnvelope::UnknownCheck { task_id, .. } => *task_id,
        }
    }
}

/// Reply list for one dispatch group.
pub fn reply_key(group: Uuid) -> String {
    format!("scoreengine:group:{}:results", group)
}

pub struct QueueBackend {
    client: redis::Client,
    queue: String,
}

impl QueueBackend {
    pub fn new(config: &QueueConfig) -> Result<Self, DispatchError> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(QueueBackend {
            client,
            queue: config.name.clone(),
        })
    }
}

#[async_trait]
impl ExecutionBackend for QueueBackend {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn execute(&self, tasks: Vec<CheckTask>) -> Result<Vec<CheckTask>, DispatchError> {
        // BLPOP stalls every command on a multiplexed connection, so each
        // dispatch gets its own.
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply_to = reply_key(Uuid::new_v4());
        let mut pending: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        let payloads = tasks
            .into_iter()
            .map(|task| {
                serde_json::to_string(&TaskEnvelope {
                    task,
                    reply_to: reply_to.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(tasks = payloads.len(), queue = %self.queue, reply_to = %reply_to, "Enqueueing checks");
        let _: () = conn.rpush(&self.queue, payloads).await?;

        let outcome = collect_results(&mut conn, &reply_to, &mut pending).await;
        let _: Result<(), _> = conn.del(&reply_to).await;
        outcome
    }
}

async fn collect_results(
    conn: &mut redis::aio::MultiplexedConnection,
    reply_to: &str,
    pending: &mut HashSet<Uuid>,
) -> Result<Vec<CheckTask>, DispatchError> {
    let mut results = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let popped: Option<(String, String)> = conn.blpop(reply_to, POLL_SECS).await?;
        let Some((_, payload)) = popped else {
            debug!(reply_to, outstanding = pending.len(), "Waiting for check results");
            continue;
        };
        let envelope: ResultEnvelope = serde_json::from_str(&payload)?;
        if !pending.remove(&envelope.task_id()) {
            warn!(task_id = %envelope.task_id(), "Ignoring duplicate or foreign check result");
            continue;
        }
        match envelope {
            ResultEnvelope::Done { task } => results.push(task),
            ResultEnvelope::UnknownCheck { group, function, .. } => {
                return Err(DispatchError::UnknownCheck { group, function });
            }
        }
    }
    Ok(results)
}
