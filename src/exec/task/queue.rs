//! Per-category wake-time-ordered task queue
//!
//! Tasks are ordered primarily by wake time and secondarily by submission
//! sequence, so ties never invert submission order. Workers block on the
//! queue's condvar: a plain wait when the queue is empty, a timed wait
//! until the earliest not-yet-eligible wake time otherwise. Nothing ever
//! busy-spins here.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::{Task, TaskState};

struct QueueInner {
    /// (wake time, submission seq) -> task. A task is present in at most
    /// one queue at a time; the pool only re-inserts after a run
    /// completes.
    ready: BTreeMap<(Instant, u64), Arc<Task>>,
    shutdown: bool,
}

/// Thread-safe collection of ready-to-run tasks for one worker category
pub(crate) struct TaskQueue {
    inner: Mutex<QueueInner>,
    task_arrived: Condvar,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                ready: BTreeMap::new(),
                shutdown: false,
            }),
            task_arrived: Condvar::new(),
        }
    }

    /// Enqueue a task and wake one waiting worker. Never blocks the
    /// submitter.
    pub(crate) fn submit(&self, task: Arc<Task>) {
        let mut inner = self.inner.lock();
        task.set_state(TaskState::Runnable);
        inner.ready.insert((task.wake_time(), task.seq()), task);
        drop(inner);
        self.task_arrived.notify_one();
    }

    /// Block until an eligible task is available, the queue shuts down,
    /// or this worker is individually stopped.
    ///
    /// Among eligible tasks the one with the earliest (wake, seq) key is
    /// returned; tasks whose wake time is still in the future are never
    /// handed out. Cancelled tasks encountered during the scan are
    /// dropped.
    pub(crate) fn next_runnable(&self, stop: &AtomicBool) -> Option<Arc<Task>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.shutdown || stop.load(Ordering::Acquire) {
                return None;
            }

            let head = inner.ready.first_key_value().map(|(key, _)| *key);
            match head {
                Some((wake, _seq)) => {
                    let now = Instant::now();
                    if wake <= now {
                        // Same entry first_key_value saw; the lock has
                        // been held throughout.
                        let Some((_, task)) = inner.ready.pop_first() else {
                            continue;
                        };
                        if task.is_cancelled() {
                            task.set_state(TaskState::Cancelled);
                            log::debug!(
                                "Dropping cancelled task {} (seq {})",
                                task.kind().description(),
                                task.seq()
                            );
                            continue;
                        }
                        return Some(task);
                    }
                    // Head not yet eligible: sleep until its wake time or
                    // a new submission, whichever comes first.
                    let _ = self.task_arrived.wait_for(&mut inner, wake - now);
                }
                None => {
                    self.task_arrived.wait(&mut inner);
                }
            }
        }
    }

    /// Number of queued (not yet running) tasks
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Wake all waiting workers so they re-check stop flags and
    /// cancellations.
    pub(crate) fn wake_all(&self) {
        self.task_arrived.notify_all();
    }

    /// Mark the queue as shut down and release every waiting worker.
    pub(crate) fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        drop(inner);
        self.task_arrived.notify_all();
    }
}
