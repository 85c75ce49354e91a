//! Named broadcast groups of workers.
//!
//! Producers do not know which workers exist; after a successful push they
//! broadcast a pull wake-up to a named group and every member decides for
//! itself whether to act (idle workers pull, busy workers ignore). Delivery
//! is best-effort and non-blocking; the 1 s idle poll in the worker is the
//! safety net for a missed wake-up.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// A wake-up delivered to group members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// There may be new work; an idle worker should pull.
    PullJob,
}

/// Registry mapping group names to the receive handles of their members.
#[derive(Debug, Clone, Default)]
pub struct Dispatch {
    groups: Arc<DashMap<String, Vec<mpsc::UnboundedSender<Wake>>>>,
}

impl Dispatch {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `group`, returning the receiver wake-ups will arrive on.
    pub fn join(&self, group: &str) -> mpsc::UnboundedReceiver<Wake> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.groups.entry(group.to_string()).or_default().push(tx);
        rx
    }

    /// Broadcast a pull wake-up to every member of `group`.
    ///
    /// Members whose receive side has gone away are pruned. Returns the
    /// number of members the wake-up reached.
    pub fn broadcast(&self, group: &str) -> usize {
        let Some(mut members) = self.groups.get_mut(group) else {
            return 0;
        };
        members.retain(|member| member.send(Wake::PullJob).is_ok());
        members.len()
    }

    /// Number of members currently registered in `group`.
    pub fn members(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |members| members.len())
    }
}
