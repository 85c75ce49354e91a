//! Worker runtime for the hopper queue.
//!
//! This crate provides the consuming half of the system: a [`JobHandler`]
//! seam for user logic, a [`Worker`] control loop that pulls messages and
//! runs each one in an isolated, kill-on-timeout task, a [`Dispatch`]
//! registry broadcasting pull wake-ups to named groups, and a
//! [`WorkerPool`] service tying them together.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod dispatch;
pub mod error;
pub mod handler;
pub mod pool;
pub mod worker;

pub use dispatch::{Dispatch, Wake};
pub use error::{Result, WorkerError};
pub use handler::JobHandler;
pub use pool::{PoolConfig, WorkerPool};
pub use worker::Worker;
