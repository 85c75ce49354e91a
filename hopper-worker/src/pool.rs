//! The worker pool service.
//!
//! Spawns a configured number of workers against one queue, joins them all
//! to the same dispatch group, and runs until shutdown.

use std::sync::Arc;

use hopper_common::Signal;
use hopper_queue::Queue;
use serde::Deserialize;
use tokio::{sync::broadcast, time::Duration};

use crate::{
    dispatch::Dispatch,
    error::{Result, WorkerError},
    handler::JobHandler,
    worker::Worker,
};

fn default_workers() -> usize {
    num_cpus::get()
}

const fn default_timeout_ms() -> u64 {
    5_000
}

const fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_group() -> String {
    "workers".to_string()
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    /// Number of workers to spawn.
    ///
    /// Default: number of CPU cores
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Hard wall-clock ceiling for a single handler invocation, in
    /// milliseconds.
    ///
    /// Default: 5000 ms
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Idle poll interval, in milliseconds. This bounds end-to-end latency
    /// after a dropped wake-up.
    ///
    /// Default: 1000 ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Dispatch group every worker joins on start.
    ///
    /// Default: `workers`
    #[serde(default = "default_group")]
    pub group: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            group: default_group(),
        }
    }
}

/// A named group of workers draining one queue.
pub struct WorkerPool {
    config: PoolConfig,
    queue: Arc<Queue>,
    handler: Arc<dyn JobHandler>,
    dispatch: Dispatch,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("queue", &self.queue.name())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Build a pool over `queue`. Workers are not spawned until
    /// [`WorkerPool::serve`].
    pub fn new(
        config: PoolConfig,
        queue: Arc<Queue>,
        handler: Arc<dyn JobHandler>,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            config,
            queue,
            handler,
            dispatch,
        }
    }

    /// The pool's configuration.
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Spawn the workers and run until every one of them has observed
    /// shutdown and stopped.
    ///
    /// # Errors
    /// Returns [`WorkerError::InvalidConfiguration`] for an empty pool.
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        if self.config.workers == 0 {
            return Err(WorkerError::InvalidConfiguration(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        tracing::info!(
            target: "hopper",
            workers = self.config.workers,
            group = %self.config.group,
            queue = self.queue.name(),
            "starting worker pool"
        );

        let mut tasks = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            let wake = self.dispatch.join(&self.config.group);
            let worker = Worker::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.handler),
                wake,
                Duration::from_millis(self.config.timeout_ms),
                Duration::from_millis(self.config.poll_interval_ms),
            );
            tasks.push(tokio::spawn(worker.run(shutdown.resubscribe())));
        }
        drop(shutdown);

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(target: "hopper", error = %e, "worker task aborted");
            }
        }

        tracing::info!(target: "hopper", queue = self.queue.name(), "worker pool stopped");

        Ok(())
    }
}
