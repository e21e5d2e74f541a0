//! Executor pool statistics
//!
//! All counters are atomic so workers never contend on a stats lock.
//! Slow-task observations additionally land in a bounded ring that keeps
//! the most recent records for operational inspection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::exec::task::TaskCategory;

/// Per-category execution counters
#[derive(Debug, Default)]
pub struct CategoryStats {
    /// Tasks executed to completion (including failed ones)
    pub tasks_run: AtomicU64,
    /// Tasks whose closure returned an error
    pub tasks_failed: AtomicU64,
    /// Executions that exceeded their expected duration
    pub slow_tasks: AtomicU64,
    /// Total wall time spent executing, nanoseconds
    pub total_run_time_ns: AtomicU64,
}

/// Point-in-time copy of one category's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySnapshot {
    pub category: TaskCategory,
    pub tasks_run: u64,
    pub tasks_failed: u64,
    pub slow_tasks: u64,
    pub total_run_time_ns: u64,
}

/// One slow-task observation: a task ran longer than it declared it
/// should. Observability only; the task was not aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowTaskObservation {
    pub category: TaskCategory,
    pub description: String,
    pub expected: Duration,
    pub actual: Duration,
}

/// Shared statistics for all worker categories
#[derive(Debug)]
pub struct PoolStatistics {
    per_category: [CategoryStats; 4],
    slow_log: Mutex<VecDeque<SlowTaskObservation>>,
    slow_log_capacity: usize,
}

impl PoolStatistics {
    pub(crate) fn new(slow_log_capacity: usize) -> Self {
        Self {
            per_category: Default::default(),
            slow_log: Mutex::new(VecDeque::with_capacity(slow_log_capacity.min(64))),
            slow_log_capacity,
        }
    }

    #[inline(always)]
    fn stats(&self, category: TaskCategory) -> &CategoryStats {
        &self.per_category[category.index()]
    }

    pub(crate) fn record_run(&self, category: TaskCategory, elapsed: Duration) {
        let stats = self.stats(category);
        stats.tasks_run.fetch_add(1, Ordering::Relaxed);
        stats
            .total_run_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, category: TaskCategory) {
        self.stats(category).tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_task(&self, observation: SlowTaskObservation) {
        self.stats(observation.category)
            .slow_tasks
            .fetch_add(1, Ordering::Relaxed);
        if self.slow_log_capacity == 0 {
            return;
        }
        let mut slow_log = self.slow_log.lock();
        while slow_log.len() >= self.slow_log_capacity {
            slow_log.pop_front();
        }
        slow_log.push_back(observation);
    }

    /// Copy of the retained slow-task observations, oldest first
    pub fn slow_tasks(&self) -> Vec<SlowTaskObservation> {
        self.slow_log.lock().iter().cloned().collect()
    }

    /// Counter snapshot for one category
    pub fn snapshot(&self, category: TaskCategory) -> CategorySnapshot {
        let stats = self.stats(category);
        CategorySnapshot {
            category,
            tasks_run: stats.tasks_run.load(Ordering::Relaxed),
            tasks_failed: stats.tasks_failed.load(Ordering::Relaxed),
            slow_tasks: stats.slow_tasks.load(Ordering::Relaxed),
            total_run_time_ns: stats.total_run_time_ns.load(Ordering::Relaxed),
        }
    }

    /// Counter snapshots for every category
    pub fn snapshot_all(&self) -> Vec<CategorySnapshot> {
        TaskCategory::ALL
            .iter()
            .map(|&category| self.snapshot(category))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_category() {
        let stats = PoolStatistics::new(8);
        stats.record_run(TaskCategory::Writer, Duration::from_millis(5));
        stats.record_run(TaskCategory::Writer, Duration::from_millis(5));
        stats.record_failure(TaskCategory::Writer);
        stats.record_run(TaskCategory::Reader, Duration::from_millis(1));

        let writer = stats.snapshot(TaskCategory::Writer);
        assert_eq!(writer.tasks_run, 2);
        assert_eq!(writer.tasks_failed, 1);
        assert_eq!(writer.total_run_time_ns, 10_000_000);
        assert_eq!(stats.snapshot(TaskCategory::Reader).tasks_run, 1);
        assert_eq!(stats.snapshot(TaskCategory::NonIo).tasks_run, 0);
    }

    #[test]
    fn slow_log_is_bounded() {
        let stats = PoolStatistics::new(2);
        for i in 0..4u64 {
            stats.record_slow_task(SlowTaskObservation {
                category: TaskCategory::AuxIo,
                description: format!("task {}", i),
                expected: Duration::from_millis(1),
                actual: Duration::from_millis(10),
            });
        }
        let retained = stats.slow_tasks();
        assert_eq!(retained.len(), 2);
        assert_eq!(retained[0].description, "task 2");
        assert_eq!(retained[1].description, "task 3");
        // Counter is exact even though the ring dropped records.
        assert_eq!(stats.snapshot(TaskCategory::AuxIo).slow_tasks, 4);
    }
}
