//! Durable, file-system-backed message queue.
//!
//! Producers push opaque payloads; workers pull them. Every state a
//! message can be in is a directory on disk, with atomic renames carrying
//! messages between states. The queue survives restarts: work that was in
//! flight when a process died is failed back as a timeout the next time
//! the queue is initialized.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod codec;
pub mod config;
pub mod dir;
pub mod error;
pub mod message;
pub mod queue;
pub mod telemetry;

pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use message::{Flag, Message};
pub use queue::Queue;
pub use telemetry::{RecordingSink, TelemetryEvent, TelemetrySink, TracingSink};
