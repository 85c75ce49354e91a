//! Durable, file-system-backed job queue with a worker pool.
//!
//! This crate ties the pieces together: [`hopper_queue`] persists opaque
//! payloads as files and moves them between states with atomic renames;
//! [`hopper_worker`] pulls them and runs user handlers under a hard
//! timeout. [`Hopper`] wires a queue, a dispatch group, and a worker pool
//! from one [`HopperConfig`], and [`Producer`] is the handle producers use
//! to push work and wake the pool.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! hopper::logging::init();
//!
//! let config = hopper::HopperConfig::from_ron(
//!     r#"(queue: (root_dir: "/var/spool/hopper", queue_name: "mail"))"#,
//! )?;
//!
//! let handler: Arc<dyn hopper::JobHandler> =
//!     Arc::new(|payload: Arc<[u8]>| async move {
//!         println!("processing {} bytes", payload.len());
//!         Ok(())
//!     });
//!
//! let (shutdown, _) = tokio::sync::broadcast::channel(1);
//! let hopper = hopper::Hopper::init(config, handler).await?;
//! let producer = hopper.producer();
//!
//! producer.push(b"job payload").await?;
//! hopper.serve(shutdown.subscribe()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::broadcast;

pub use hopper_common::{Signal, logging};
pub use hopper_queue::{
    Flag, Message, Queue, QueueConfig, QueueError, RecordingSink, TelemetryEvent, TelemetrySink,
    TracingSink,
};
pub use hopper_worker::{Dispatch, JobHandler, PoolConfig, Wake, Worker, WorkerError, WorkerPool};

/// Top-level configuration: one queue, one pool draining it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HopperConfig {
    /// The queue definition, including any dead-letter routing.
    #[serde(default)]
    pub queue: QueueConfig,

    /// The worker pool draining the queue.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl HopperConfig {
    /// Parse a configuration from RON text.
    ///
    /// # Errors
    /// Fails when the text is not valid RON for this schema.
    pub fn from_ron(source: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(source)?)
    }
}

/// A fully wired system: queue, dispatch group, and worker pool.
#[derive(Debug)]
pub struct Hopper {
    queue: Arc<Queue>,
    dispatch: Dispatch,
    pool: WorkerPool,
}

impl Hopper {
    /// Initialize the queue (including crash recovery) and build the pool.
    /// Workers start when [`Hopper::serve`] is called.
    ///
    /// # Errors
    /// Surfaces queue initialization failures.
    pub async fn init(
        config: HopperConfig,
        handler: Arc<dyn JobHandler>,
    ) -> hopper_queue::Result<Self> {
        Self::init_with_sink(config, handler, Arc::new(TracingSink)).await
    }

    /// [`Hopper::init`] with a caller-supplied telemetry sink.
    ///
    /// # Errors
    /// Surfaces queue initialization failures.
    pub async fn init_with_sink(
        config: HopperConfig,
        handler: Arc<dyn JobHandler>,
        sink: Arc<dyn TelemetrySink>,
    ) -> hopper_queue::Result<Self> {
        let queue = Arc::new(Queue::init_with_sink(config.queue, sink).await?);
        let dispatch = Dispatch::new();
        let pool = WorkerPool::new(config.pool, Arc::clone(&queue), handler, dispatch.clone());

        Ok(Self {
            queue,
            dispatch,
            pool,
        })
    }

    /// The underlying queue.
    pub const fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// A producer handle for pushing work into this system.
    pub fn producer(&self) -> Producer {
        Producer {
            queue: Arc::clone(&self.queue),
            dispatch: self.dispatch.clone(),
            group: self.pool.config().group.clone(),
        }
    }

    /// Run the worker pool until shutdown.
    ///
    /// # Errors
    /// Surfaces worker pool configuration failures.
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> hopper_worker::Result<()> {
        self.pool.serve(shutdown).await
    }
}

/// Handle for enqueuing work: a durable push followed by a best-effort
/// wake-up broadcast to the worker group.
#[derive(Debug, Clone)]
pub struct Producer {
    queue: Arc<Queue>,
    dispatch: Dispatch,
    group: String,
}

impl Producer {
    /// Push a payload and wake the workers.
    ///
    /// The push is durable once this returns `Ok`; the wake-up is
    /// best-effort, with the workers' idle poll as the fallback.
    ///
    /// # Errors
    /// Surfaces push failures (`queue full`, payload too large, I/O).
    pub async fn push(&self, payload: &[u8]) -> hopper_queue::Result<()> {
        self.queue.push(payload).await?;
        self.dispatch.broadcast(&self.group);
        Ok(())
    }
}
