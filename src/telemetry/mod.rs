//! Aggregated core statistics
//!
//! Point-in-time snapshots assembled by the facade from the pool, the
//! cookie registry and the audit daemon. All underlying counters are
//! atomic; a snapshot is consistent per counter, not across counters.

use crate::exec::pool::{CategorySnapshot, SlowTaskObservation};

/// One consolidated statistics snapshot for the whole core
#[derive(Debug, Clone)]
pub struct CoreStatsSnapshot {
    /// Per-category execution counters
    pub categories: Vec<CategorySnapshot>,
    /// Retained slow-task observations, oldest first
    pub slow_tasks: Vec<SlowTaskObservation>,
    /// Live registered connections
    pub live_cookies: usize,
    /// Notifications that targeted an already-destroyed cookie
    pub stale_notifications: u64,
    /// Audit events durably written
    pub audit_written: u64,
    /// Audit events dropped by the bounded queue
    pub audit_dropped: u64,
    /// Audit events the sink failed to record
    pub audit_write_failures: u64,
}

impl CoreStatsSnapshot {
    /// Total tasks executed across all categories
    pub fn total_tasks_run(&self) -> u64 {
        self.categories.iter().map(|c| c.tasks_run).sum()
    }

    /// Total contained task failures across all categories
    pub fn total_tasks_failed(&self) -> u64 {
        self.categories.iter().map(|c| c.tasks_failed).sum()
    }
}
