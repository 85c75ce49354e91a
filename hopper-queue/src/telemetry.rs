//! Telemetry hooks emitted by queue operations.
//!
//! The queue reports three events: the queue length observed at every push,
//! each successful push, and each successful pull. Sinks are pluggable;
//! the queue never lets a sink failure affect the operation that produced
//! the event, so `record` is infallible by construction.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// An observation emitted as a side effect of a queue operation.
///
/// The event names returned by [`TelemetryEvent::name`] are part of the
/// external contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// `queue.length`: the size of `queued/` observed at push time.
    Length { queue: String, length: usize },
    /// `queue.push`: a payload was durably enqueued.
    Push { queue: String, items: usize },
    /// `queue.pull`: a message was handed to a worker.
    Pull { queue: String, timestamp_ms: u64 },
}

impl TelemetryEvent {
    /// The metric key for this event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Length { .. } => "queue.length",
            Self::Push { .. } => "queue.push",
            Self::Pull { .. } => "queue.pull",
        }
    }

    /// The queue that emitted this event.
    pub fn queue(&self) -> &str {
        match self {
            Self::Length { queue, .. } | Self::Push { queue, .. } | Self::Pull { queue, .. } => {
                queue
            }
        }
    }
}

/// Destination for queue telemetry.
pub trait TelemetrySink: Send + Sync + std::fmt::Debug {
    /// Record one event. Must not block or fail.
    fn record(&self, event: &TelemetryEvent);
}

/// Default sink: forwards events to `tracing` under the `hopper` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::Length { queue, length } => {
                tracing::debug!(target: "hopper", queue = %queue, length, "queue.length");
            }
            TelemetryEvent::Push { queue, items } => {
                tracing::debug!(target: "hopper", queue = %queue, items, "queue.push");
            }
            TelemetryEvent::Pull {
                queue,
                timestamp_ms,
            } => {
                tracing::debug!(target: "hopper", queue = %queue, timestamp_ms, "queue.pull");
            }
        }
    }
}

/// Recording sink for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    notify: Arc<Notify>,
}

impl RecordingSink {
    /// Create a new empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events.
    ///
    /// # Panics
    /// Panics if the events mutex is poisoned.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .expect("RecordingSink events mutex poisoned")
            .clone()
    }

    /// Get the number of recorded events.
    ///
    /// # Panics
    /// Panics if the events mutex is poisoned.
    pub fn count(&self) -> usize {
        self.events
            .lock()
            .expect("RecordingSink events mutex poisoned")
            .len()
    }

    /// Clear all recorded events.
    ///
    /// # Panics
    /// Panics if the events mutex is poisoned.
    pub fn clear(&self) {
        self.events
            .lock()
            .expect("RecordingSink events mutex poisoned")
            .clear();
    }

    /// Wait for a specific number of events to be recorded, with timeout.
    ///
    /// # Errors
    /// Returns an error if the timeout is reached before the expected count.
    pub async fn wait_for_count(
        &self,
        expected: usize,
        timeout: std::time::Duration,
    ) -> anyhow::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                if self.count() >= expected {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await?;
        Ok(())
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, event: &TelemetryEvent) {
        self.events
            .lock()
            .expect("RecordingSink events mutex poisoned")
            .push(event.clone());
        self.notify.notify_waiters();
    }
}
