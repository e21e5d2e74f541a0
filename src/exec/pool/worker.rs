//! Worker thread main loop
//!
//! Each worker pulls eligible tasks from its category queue, measures
//! execution wall time, records slow-task observations, and contains
//! task failures. One task's failure never stops the worker.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use super::statistics::{PoolStatistics, SlowTaskObservation};
use crate::exec::task::queue::TaskQueue;
use crate::exec::task::{TaskCategory, TaskState};

pub(super) fn worker_loop(
    category: TaskCategory,
    worker_id: usize,
    queue: Arc<TaskQueue>,
    stats: Arc<PoolStatistics>,
    stop: Arc<AtomicBool>,
) {
    log::debug!("{}-worker-{} started", category, worker_id);

    while let Some(task) = queue.next_runnable(&stop) {
        task.set_state(TaskState::Running);
        let started = Instant::now();
        let result = task.execute();
        let elapsed = started.elapsed();

        stats.record_run(category, elapsed);

        let expected = task.expected_duration();
        if elapsed > expected {
            log::warn!(
                "Slow runtime for '{}' on {} thread: expected {:?}, took {:?}",
                task.kind().description(),
                category,
                expected,
                elapsed
            );
            stats.record_slow_task(SlowTaskObservation {
                category,
                description: task.kind().description(),
                expected,
                actual: elapsed,
            });
        }

        match result {
            Ok(true) => {
                if task.is_cancelled() {
                    task.set_state(TaskState::Cancelled);
                } else {
                    // Periodic task: the pool recomputes the next wake
                    // time and re-enqueues under the same identity.
                    let next_wake = match task.period() {
                        Some(period) => Instant::now() + period,
                        None => Instant::now(),
                    };
                    task.set_wake_time(next_wake);
                    task.set_state(TaskState::Rescheduled);
                    queue.submit(task);
                }
            }
            Ok(false) => {
                task.set_state(TaskState::Completed);
            }
            Err(err) => {
                // Failures are contained per task: log with identity and
                // category, mark completed, keep the worker alive.
                log::error!(
                    "Task '{}' (seq {}) failed on {} thread: {}",
                    task.kind().description(),
                    task.seq(),
                    category,
                    err
                );
                stats.record_failure(category);
                task.set_state(TaskState::Completed);
            }
        }
    }

    log::debug!("{}-worker-{} exiting", category, worker_id);
}
