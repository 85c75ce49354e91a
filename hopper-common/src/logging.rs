//! Logging setup.
//!
//! Every crate in the workspace emits `tracing` events under the
//! [`TARGET`] target, tagged with structured `queue`/`worker` fields, so
//! an embedding application can route or silence the whole subsystem with
//! a single filter directive without touching its own subscriber layers.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Target under which queue, worker, and telemetry events are emitted.
pub const TARGET: &str = "hopper";

/// Filter applied when `RUST_LOG` is unset: the [`TARGET`] events only,
/// with debug builds tracing the full message lifecycle and release
/// builds reporting milestones and problems.
fn default_filter() -> EnvFilter {
    let level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };
    EnvFilter::new(format!("{TARGET}={level}"))
}

/// Install the global subscriber.
///
/// Honors `RUST_LOG` when set (standard `tracing` directives, e.g.
/// `RUST_LOG=hopper=trace`); otherwise only [`TARGET`] events pass, at a
/// level chosen by build profile.
///
/// # Panics
/// Panics if a global subscriber is already installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}
