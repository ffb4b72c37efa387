//! # Worker — Redis Queue Consumer
//!
//! `scoreengine worker` pops [`TaskEnvelope`]s from the queue list, runs each
//! check through the invoker and pushes a [`ResultEnvelope`] to the task's
//! reply list.
//!
//! - At most `worker.concurrency` checks run at once (tokio semaphore).
//! - Each check runs on the blocking pool under `worker.soft_time_limit`.
//!   A check that overruns is reported as failed with an
//!   `ERROR: SoftTimeLimitExceeded` line; the blocking thread is left to
//!   finish on its own since probes cannot be interrupted mid-call.
//! - Unknown checks are reported back as [`ResultEnvelope::UnknownCheck`]
//!   so the dispatcher can abort the round.
//! - On warm shutdown the worker stops popping and waits for in-flight
//!   checks to push their results.

use crate::config::Config;
use crate::dispatch::queue::{ResultEnvelope, TaskEnvelope, RESULT_TTL_SECS};
use crate::invoker::{self, ProbeError, ProbeRegistry, UnknownCheck};
use crate::shutdown::Shutdown;
use crate::task::CheckTask;
use anyhow::Result;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Seconds per `BLPOP` poll, bounding how long shutdown goes unnoticed.
const POLL_SECS: f64 = 2.0;

/// Run `task` under `limit`, converting an overrun into a failed result.
pub async fn run_with_limit(
    registry: Arc<ProbeRegistry>,
    task: CheckTask,
    limit: Duration,
) -> ResultEnvelope {
    let task_id = task.id;
    let mut fallback = task.clone();
    let job = tokio::task::spawn_blocking(move || invoker::invoke(&registry, task));

    match tokio::time::timeout(limit, job).await {
        Ok(Ok(Ok(done))) => ResultEnvelope::Done { task: done },
        Ok(Ok(Err(UnknownCheck { group, function }))) => ResultEnvelope::UnknownCheck {
            task_id,
            group,
            function,
        },
        Ok(Err(join)) => {
            error!(task_id = %task_id, error = %join, "Check panicked");
            fallback.output.push(format!("ERROR: Panic: {}", join));
            ResultEnvelope::Done { task: fallback }
        }
        Err(_) => {
            let err = ProbeError::SoftTimeLimitExceeded(limit.as_secs());
            warn!(
                team = %fallback.team_name,
                service = %fallback.service_name,
                limit_secs = limit.as_secs(),
                "Check exceeded soft time limit"
            );
            fallback.passed = false;
            fallback.output.push(err.output_line());
            ResultEnvelope::Done { task: fallback }
        }
    }
}

pub struct QueueWorker {
    config: Arc<Config>,
    registry: Arc<ProbeRegistry>,
    shutdown: Shutdown,
}

impl QueueWorker {
    pub fn new(config: Arc<Config>, registry: Arc<ProbeRegistry>, shutdown: Shutdown) -> Self {
        QueueWorker {
            config,
            registry,
            shutdown,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let client = redis::Client::open(self.config.queue.redis_url.as_str())?;
        // Blocking pops get their own connection; results go out on a shared one.
        let mut pop_conn = client.get_multiplexed_async_connection().await?;
        let push_conn = client.get_multiplexed_async_connection().await?;

        let concurrency = u32::try_from(self.config.worker.concurrency.max(1))
            .map_err(|_| anyhow::anyhow!("worker.concurrency {} is too large", self.config.worker.concurrency))?;
        let limit = Duration::from_secs(self.config.worker.soft_time_limit);
        let permits = Arc::new(Semaphore::new(concurrency as usize));
        info!(
            queue = %self.config.queue.name,
            concurrency,
            soft_time_limit = limit.as_secs(),
            checks = self.registry.len(),
            "Worker started"
        );

        while self.shutdown.is_running() {
            let permit = tokio::select! {
                p = Arc::clone(&permits).acquire_owned() => p?,
                _ = self.shutdown.requested() => break,
            };

            let popped: Option<(String, String)> =
                match pop_conn.blpop(&self.config.queue.name, POLL_SECS).await {
                    Ok(popped) => popped,
                    Err(e) => {
                        warn!(error = %e, "Queue pop failed, retrying");
                        drop(permit);
                        if !self.shutdown.sleep(Duration::from_secs(1)).await {
                            break;
                        }
                        continue;
                    }
                };
            let Some((_, payload)) = popped else {
                continue;
            };

            let envelope: TaskEnvelope = match serde_json::from_str(&payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(error = %e, "Dropping malformed task payload");
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            let mut conn = push_conn.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let TaskEnvelope { task, reply_to } = envelope;
                debug!(check = %task.check, team = %task.team_name, "Running check");
                let result = run_with_limit(registry, task, limit).await;
                if let Err(e) = push_result(&mut conn, &reply_to, &result).await {
                    error!(reply_to = %reply_to, error = %e, "Failed to push check result");
                }
            });
        }

        // Every permit back means every in-flight check has pushed its result.
        match permits.acquire_many(concurrency).await {
            Ok(_) => info!("Worker stopped"),
            Err(e) => error!(error = %e, "Worker stopped without waiting for in-flight checks"),
        }
        Ok(())
    }
}

async fn push_result(
    conn: &mut redis::aio::MultiplexedConnection,
    reply_to: &str,
    result: &ResultEnvelope,
) -> Result<()> {
    let payload = serde_json::to_string(result)?;
    redis::pipe()
        .rpush(reply_to, payload)
        .expire(reply_to, RESULT_TTL_SECS)
        .exec_async(conn)
        .await?;
    Ok(())
}
