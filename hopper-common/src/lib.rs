//! Shared primitives for the hopper workspace: the shutdown [`Signal`]
//! broadcast between long-running services, and the tracing-based logging
//! setup used by every crate.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod logging;

/// Control signal broadcast to every long-running service in the system.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    /// Stop accepting new work and exit once the current job settles.
    Shutdown,
    /// All services have wound down; final cleanup may run.
    Finalised,
}
