//! Per-owner accounting of queued and executing jobs.

use std::collections::HashMap;

/// Counts outstanding jobs per owner key.
///
/// A key is present only while its count is at least one.
#[derive(Debug, Default)]
pub struct PendingTracker {
    counts: HashMap<String, usize>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly admitted job for `owner`.
    pub fn increment(&mut self, owner: &str) {
        *self.counts.entry(owner.to_string()).or_insert(0) += 1;
    }

    /// Record a settled job for `owner`. Removes the key when it reaches zero.
    pub fn decrement(&mut self, owner: &str) {
        let Some(count) = self.counts.get_mut(owner) else {
            tracing::warn!(owner, "Pending decrement for owner with no outstanding jobs");
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(owner);
        }
    }

    /// Outstanding jobs for `owner`.
    pub fn count(&self, owner: &str) -> usize {
        self.counts.get(owner).copied().unwrap_or(0)
    }
}
