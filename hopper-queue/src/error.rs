//! Error types for the hopper-queue crate.
//!
//! All queue operations return [`QueueError`], which categorizes failures
//! into capacity, size, filename, configuration, and I/O errors.

use std::io;

use thiserror::Error;

/// Top-level queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Push rejected because `queued/` is at capacity.
    #[error("queue full: {queued}/{max} messages queued")]
    Full { queued: usize, max: usize },

    /// Push rejected because the payload exceeds the configured size bound.
    #[error("message too large: {size} bytes (limit {max})")]
    TooLarge { size: usize, max: usize },

    /// A filename did not follow the `<timestamp>[.<flag>]*` grammar.
    #[error("unparseable message filename: {0:?}")]
    BadName(String),

    /// Queue configuration failed validation.
    #[error("invalid queue configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O operation failed (rename/list/read/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Specialized `Result` type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
