//! Queue configuration.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{QueueError, Result};

const fn default_max_retries() -> Option<u32> {
    Some(25)
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("/var/spool/hopper")
}

fn default_queue_name() -> String {
    "default".to_string()
}

/// Policy and placement for one named queue.
///
/// A dead-letter queue is itself a full `QueueConfig`, so exhausted or
/// expired work can be routed into a sibling queue with its own policy
/// (including, recursively, a dead-letter queue of its own).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// Parent directory containing every queue.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Directory name of this queue; unique under `root_dir`.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Failed attempts allowed before a message is dead-lettered or
    /// discarded. `None` disables the cap.
    ///
    /// Default: 25 attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: Option<u32>,

    /// Reject pushes once `queued/` holds this many messages.
    ///
    /// Default: unbounded
    #[serde(default)]
    pub max_queued_messages: Option<usize>,

    /// Reject pushes whose payload exceeds this many bytes.
    ///
    /// Default: unbounded
    #[serde(default)]
    pub max_message_bytes: Option<usize>,

    /// Messages older than this at pull time are routed as dead instead of
    /// being handed to a worker.
    ///
    /// Default: never expire
    #[serde(default)]
    pub message_ttl_seconds: Option<u64>,

    /// Dead-letter sink for terminally failed or expired messages.
    ///
    /// Default: none (terminal failures are discarded)
    #[serde(default)]
    pub dead_letters: Option<Box<QueueConfig>>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            queue_name: default_queue_name(),
            max_retries: default_max_retries(),
            max_queued_messages: None,
            max_message_bytes: None,
            message_ttl_seconds: None,
            dead_letters: None,
        }
    }
}

impl QueueConfig {
    /// Check that this configuration can safely be turned into directories.
    ///
    /// The queue name becomes a path component under `root_dir`, so names
    /// that are empty or could escape the root are rejected here rather
    /// than surfacing later as filesystem surprises.
    ///
    /// # Errors
    /// Returns [`QueueError::InvalidConfiguration`] describing the problem.
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(QueueError::InvalidConfiguration(
                "root_dir cannot be empty".to_string(),
            ));
        }

        if self.queue_name.is_empty() {
            return Err(QueueError::InvalidConfiguration(
                "queue_name cannot be empty".to_string(),
            ));
        }

        if self.queue_name.contains('/')
            || self.queue_name.contains('\\')
            || self.queue_name.contains("..")
        {
            return Err(QueueError::InvalidConfiguration(format!(
                "queue_name {:?} cannot contain path separators or '..'",
                self.queue_name
            )));
        }

        Ok(())
    }
}
