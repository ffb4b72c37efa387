//! Local execution backend: a dedicated rayon pool of `worker.concurrency`
//! threads. The blocking fan-out runs under `spawn_blocking` so the async
//! scheduler keeps ticking while probes wait on the network.

use super::{DispatchError, ExecutionBackend};
use crate::invoker::{self, ProbeRegistry};
use crate::task::CheckTask;
use async_trait::async_trait;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

pub struct LocalBackend {
    registry: Arc<ProbeRegistry>,
    pool: Arc<rayon::ThreadPool>,
}

impl LocalBackend {
    pub fn new(registry: Arc<ProbeRegistry>, concurrency: usize) -> Result<Self, DispatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("check-{}", i))
            .build()
            .map_err(|e| DispatchError::Backend(format!("failed to build worker pool: {}", e)))?;
        Ok(LocalBackend {
            registry,
            pool: Arc::new(pool),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(&self, tasks: Vec<CheckTask>) -> Result<Vec<CheckTask>, DispatchError> {
        let registry = Arc::clone(&self.registry);
        let pool = Arc::clone(&self.pool);
        debug!(tasks = tasks.len(), threads = pool.current_num_threads(), "Running checks locally");

        let results = tokio::task::spawn_blocking(move || {
            pool.install(|| {
                tasks
                    .into_par_iter()
                    .map(|task| invoker::invoke(&registry, task))
                    .collect::<Result<Vec<_>, _>>()
            })
        })
        .await
        .map_err(|e| DispatchError::Backend(format!("local worker pool panicked: {}", e)))??;
        Ok(results)
    }
}
