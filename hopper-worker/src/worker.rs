//! The per-worker control loop.
//!
//! A worker alternates between two states. Idle: suspended on a pull
//! wake-up, the idle-poll timer, or shutdown. Busy: one message bound to
//! one supervised job task, suspended on that task's completion or its
//! deadline. Handler failures never propagate to the worker; every outcome
//! is translated into a queue transition and the loop continues.

use std::sync::Arc;

use hopper_common::Signal;
use hopper_queue::{Flag, Message, Queue};
use tokio::{
    sync::{broadcast, mpsc},
    time::{Duration, Instant},
};

use crate::{dispatch::Wake, handler::JobHandler};

/// How a finished job task is translated back into queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Acknowledge,
    Error,
    Timeout,
}

/// A long-lived consumer bound to one queue.
pub struct Worker {
    queue: Arc<Queue>,
    handler: Arc<dyn JobHandler>,
    wake: mpsc::UnboundedReceiver<Wake>,
    timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("queue", &self.queue.name())
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Build a worker. `wake` is the receive handle obtained from
    /// [`crate::Dispatch::join`]; `timeout` is the hard per-job wall-clock
    /// ceiling; `poll_interval` bounds how long a dropped wake-up can delay
    /// an idle worker.
    pub fn new(
        queue: Arc<Queue>,
        handler: Arc<dyn JobHandler>,
        wake: mpsc::UnboundedReceiver<Wake>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            wake,
            timeout,
            poll_interval,
        }
    }

    /// Run until shutdown. Never returns early on job failures.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<Signal>) {
        tracing::debug!(target: "hopper", queue = self.queue.name(), "worker started");

        'idle: loop {
            let pulled = tokio::select! {
                signal = shutdown.recv() => match signal {
                    Ok(Signal::Shutdown | Signal::Finalised) | Err(_) => break 'idle,
                },
                Some(Wake::PullJob) = self.wake.recv() => self.try_pull().await,
                () = tokio::time::sleep(self.poll_interval) => self.try_pull().await,
            };

            let Some(mut message) = pulled else {
                continue;
            };

            // Drain: after each settled job, check for more work before
            // going back to sleep.
            loop {
                self.process(message).await;

                if !matches!(
                    shutdown.try_recv(),
                    Err(broadcast::error::TryRecvError::Empty)
                ) {
                    break 'idle;
                }

                match self.try_pull().await {
                    Some(next) => message = next,
                    None => continue 'idle,
                }
            }
        }

        tracing::debug!(target: "hopper", queue = self.queue.name(), "worker stopped");
    }

    async fn try_pull(&self) -> Option<Message> {
        match self.queue.pull().await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    target: "hopper",
                    queue = self.queue.name(),
                    error = %e,
                    "pull failed"
                );
                None
            }
        }
    }

    /// Run one message through the handler in an isolated task and settle
    /// the outcome.
    async fn process(&mut self, message: Message) {
        let handler = Arc::clone(&self.handler);
        let payload = message.payload();
        let mut job = tokio::spawn(async move { handler.handle(payload).await });
        let deadline = Instant::now() + self.timeout;

        let outcome = loop {
            tokio::select! {
                result = &mut job => break match result {
                    Ok(Ok(())) => Outcome::Acknowledge,
                    Ok(Err(e)) => {
                        tracing::warn!(
                            target: "hopper",
                            queue = self.queue.name(),
                            timestamp_ms = message.timestamp_ms(),
                            error = %e,
                            "handler returned error"
                        );
                        Outcome::Error
                    }
                    Err(e) if e.is_panic() => {
                        tracing::warn!(
                            target: "hopper",
                            queue = self.queue.name(),
                            timestamp_ms = message.timestamp_ms(),
                            "handler panicked"
                        );
                        Outcome::Error
                    }
                    Err(_) => Outcome::Timeout,
                },
                () = tokio::time::sleep_until(deadline) => {
                    // Hard kill; there is no cooperative cancellation.
                    job.abort();
                    tracing::warn!(
                        target: "hopper",
                        queue = self.queue.name(),
                        timestamp_ms = message.timestamp_ms(),
                        timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                        "handler timed out"
                    );
                    break Outcome::Timeout;
                }
                // Already busy; wake-ups are for idle workers.
                Some(Wake::PullJob) = self.wake.recv() => {}
            }
        };

        let settled = match outcome {
            Outcome::Acknowledge => self.queue.acknowledge(&message).await,
            Outcome::Error => self.queue.fail(&message, Flag::Error).await,
            Outcome::Timeout => self.queue.fail(&message, Flag::Timeout).await,
        };

        if let Err(e) = settled {
            tracing::error!(
                target: "hopper",
                queue = self.queue.name(),
                timestamp_ms = message.timestamp_ms(),
                error = %e,
                "failed to settle job outcome"
            );
        }
    }
}
