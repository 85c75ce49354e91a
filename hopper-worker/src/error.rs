//! Error types for the hopper-worker crate.

use thiserror::Error;

/// Errors surfaced by the worker pool.
///
/// Individual job outcomes never appear here: handler errors, panics, and
/// timeouts are absorbed by the worker and turned into queue transitions.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Worker pool configuration failed validation.
    #[error("invalid worker configuration: {0}")]
    InvalidConfiguration(String),
}

/// Specialized `Result` type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
