//! Categorized worker pool executor
//!
//! The [`ExecutorPool`] owns one wake-time-ordered queue and a set of
//! named worker threads per [`TaskCategory`]. It is an explicit object
//! with a documented lifetime: created once at startup, torn down at
//! shutdown by stopping queues and joining every worker. Never an
//! ambient global.

pub(crate) mod statistics;
mod worker;

pub use statistics::{CategorySnapshot, PoolStatistics, SlowTaskObservation};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::config::CoreConfig;
use super::task::queue::TaskQueue;
use super::task::{Task, TaskCategory, TaskFn, TaskHandle, TaskKind, TaskState};
use super::types::CoreOperationError;

struct WorkerSlot {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Fixed sets of categorized worker threads pulling from per-category
/// task queues.
pub struct ExecutorPool {
    queues: [Arc<TaskQueue>; 4],
    workers: Mutex<[Vec<WorkerSlot>; 4]>,
    next_worker_id: [AtomicU64; 4],
    stats: Arc<PoolStatistics>,
    next_seq: AtomicU64,
    shutting_down: AtomicBool,
}

impl ExecutorPool {
    /// Spawn the configured worker threads for every category.
    ///
    /// Failure to create the minimum required threads is fatal to
    /// process initialization; the partially built pool is torn down
    /// before the error is returned.
    pub fn new(config: &CoreConfig) -> Result<Self, CoreOperationError> {
        config.validate()?;

        let pool = Self {
            queues: [
                Arc::new(TaskQueue::new()),
                Arc::new(TaskQueue::new()),
                Arc::new(TaskQueue::new()),
                Arc::new(TaskQueue::new()),
            ],
            workers: Mutex::new(Default::default()),
            next_worker_id: Default::default(),
            stats: Arc::new(PoolStatistics::new(config.slow_task_log_capacity)),
            next_seq: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
        };

        for category in TaskCategory::ALL {
            if let Err(err) = pool.resize_category(category, config.thread_count(category)) {
                pool.shutdown();
                return Err(err);
            }
        }

        log::info!(
            "ExecutorPool started: {} writer / {} reader / {} auxio / {} nonio threads",
            config.writer_threads,
            config.reader_threads,
            config.auxio_threads,
            config.nonio_threads
        );
        Ok(pool)
    }

    #[inline(always)]
    fn queue(&self, category: TaskCategory) -> &Arc<TaskQueue> {
        &self.queues[category.index()]
    }

    fn spawn_worker(
        &self,
        category: TaskCategory,
    ) -> Result<WorkerSlot, CoreOperationError> {
        let worker_id =
            self.next_worker_id[category.index()].fetch_add(1, Ordering::Relaxed) as usize;
        let stop = Arc::new(AtomicBool::new(false));
        let queue = self.queue(category).clone();
        let stats = self.stats.clone();
        let thread_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("{}-worker-{}", category.label(), worker_id))
            .spawn(move || {
                worker::worker_loop(category, worker_id, queue, stats, thread_stop);
            })
            .map_err(|err| {
                CoreOperationError::initialization_failed(format!(
                    "failed to spawn {} worker {}: {}",
                    category, worker_id, err
                ))
            })?;

        Ok(WorkerSlot { stop, handle })
    }

    /// Apply a new thread count for one category.
    ///
    /// In-flight and queued tasks are untouched: scaling up spawns
    /// additional workers on the existing queue, scaling down stops the
    /// excess workers once they finish their current task.
    pub fn resize_category(
        &self,
        category: TaskCategory,
        target: usize,
    ) -> Result<(), CoreOperationError> {
        if target == 0 {
            return Err(CoreOperationError::invalid_configuration(format!(
                "{} thread count must be at least 1",
                category
            )));
        }
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(CoreOperationError::ShuttingDown);
        }

        let mut workers = self.workers.lock();
        let slots = &mut workers[category.index()];

        while slots.len() < target {
            slots.push(self.spawn_worker(category)?);
        }
        while slots.len() > target {
            if let Some(slot) = slots.pop() {
                slot.stop.store(true, Ordering::Release);
                self.queue(category).wake_all();
                if slot.handle.join().is_err() {
                    log::warn!("{} worker panicked while stopping", category);
                }
            }
        }
        Ok(())
    }

    /// Current worker thread count for a category
    pub fn thread_count(&self, category: TaskCategory) -> usize {
        self.workers.lock()[category.index()].len()
    }

    /// Number of queued tasks for a category
    pub fn queue_len(&self, category: TaskCategory) -> usize {
        self.queue(category).len()
    }

    /// Pool-wide execution statistics
    pub fn statistics(&self) -> &Arc<PoolStatistics> {
        &self.stats
    }

    fn schedule_inner(
        &self,
        kind: TaskKind,
        category: TaskCategory,
        wake: Instant,
        expected: Duration,
        period: Option<Duration>,
        run: TaskFn,
    ) -> Result<TaskHandle, CoreOperationError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(CoreOperationError::ShuttingDown);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(Task::new(kind, seq, category, wake, expected, period, run));
        let handle = TaskHandle::new(&task);
        self.queue(category).submit(task);
        Ok(handle)
    }

    /// Schedule a task for immediate execution, deriving category and
    /// expected duration from its kind.
    pub fn schedule(&self, kind: TaskKind, run: TaskFn) -> Result<TaskHandle, CoreOperationError> {
        let category = kind.category();
        let expected = kind.expected_duration();
        self.schedule_inner(kind, category, Instant::now(), expected, None, run)
    }

    /// Schedule a task to become eligible after `delay`.
    pub fn schedule_in(
        &self,
        kind: TaskKind,
        delay: Duration,
        run: TaskFn,
    ) -> Result<TaskHandle, CoreOperationError> {
        let category = kind.category();
        let expected = kind.expected_duration();
        self.schedule_inner(kind, category, Instant::now() + delay, expected, None, run)
    }

    /// Schedule a periodic task. The first run happens one period after
    /// submission; each completion that returns `Ok(true)` re-enqueues
    /// with a freshly computed wake time under the same identity.
    pub fn schedule_periodic(
        &self,
        kind: TaskKind,
        period: Duration,
        run: TaskFn,
    ) -> Result<TaskHandle, CoreOperationError> {
        let category = kind.category();
        let expected = kind.expected_duration();
        self.schedule_inner(
            kind,
            category,
            Instant::now() + period,
            expected,
            Some(period),
            run,
        )
    }

    /// Full-control scheduling: explicit category, wake time and
    /// expected duration.
    pub fn schedule_at(
        &self,
        category: TaskCategory,
        wake: Instant,
        expected: Duration,
        kind: TaskKind,
        run: TaskFn,
    ) -> Result<TaskHandle, CoreOperationError> {
        self.schedule_inner(kind, category, wake, expected, None, run)
    }

    /// Cancel a scheduled task.
    ///
    /// Returns true if the task was still owned by the pool and had not
    /// reached a terminal state. A cancelled task is never executed; its
    /// queue drops it on the next scan.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        match handle.upgrade() {
            Some(task) => {
                if matches!(
                    task.state(),
                    TaskState::Completed | TaskState::Cancelled
                ) {
                    return false;
                }
                task.cancel();
                self.queue(task.category()).wake_all();
                true
            }
            None => false,
        }
    }

    /// Stop all queues and join every worker thread. Queued tasks that
    /// never became eligible are dropped; the audit subsystem is the
    /// only component with a drain guarantee.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for queue in &self.queues {
            queue.shutdown();
        }
        let mut workers = self.workers.lock();
        for (index, slots) in workers.iter_mut().enumerate() {
            let category = TaskCategory::ALL[index];
            for slot in slots.drain(..) {
                slot.stop.store(true, Ordering::Release);
                if slot.handle.join().is_err() {
                    log::warn!("{} worker panicked during shutdown", category);
                }
            }
        }
        log::info!("ExecutorPool shut down");
    }
}

impl Drop for ExecutorPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ExecutorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorPool")
            .field("shutting_down", &self.shutting_down.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::mpsc;

    fn small_pool() -> ExecutorPool {
        let config = CoreConfig {
            writer_threads: 1,
            reader_threads: 1,
            auxio_threads: 1,
            nonio_threads: 1,
            ..CoreConfig::default()
        };
        ExecutorPool::new(&config).unwrap()
    }

    #[test]
    fn executes_in_wake_time_order() {
        let pool = small_pool();
        let order: Arc<PlMutex<Vec<u32>>> = Arc::new(PlMutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        // Single writer thread: execution order is observable. The later
        // wake time must run last even though it was submitted first.
        let record = |tag: u32| {
            let order = order.clone();
            let done_tx = done_tx.clone();
            Box::new(move || {
                order.lock().push(tag);
                let _ = done_tx.send(tag);
                Ok(false)
            }) as TaskFn
        };
        pool.schedule_in(
            TaskKind::DiskFlush { shard: 1 },
            Duration::from_millis(60),
            record(3),
        )
        .unwrap();
        pool.schedule(TaskKind::DiskFlush { shard: 2 }, record(1)).unwrap();
        pool.schedule(TaskKind::DiskFlush { shard: 3 }, record(2)).unwrap();

        for _ in 0..3 {
            done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        assert_eq!(*order.lock(), vec![1, 2, 3]);
        pool.shutdown();
    }

    #[test]
    fn task_never_runs_before_wake_time() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();
        let scheduled = Instant::now();
        let wake_delay = Duration::from_millis(50);
        pool.schedule_in(
            TaskKind::WorkloadMonitor,
            wake_delay,
            Box::new(move || {
                let _ = tx.send(Instant::now());
                Ok(false)
            }),
        )
        .unwrap();
        let ran_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(ran_at.duration_since(scheduled) >= wake_delay);
        pool.shutdown();
    }

    #[test]
    fn periodic_task_reruns_until_cancelled() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();
        let handle = pool
            .schedule_periodic(
                TaskKind::WorkloadMonitor,
                Duration::from_millis(10),
                Box::new(move || {
                    let _ = tx.send(());
                    Ok(true)
                }),
            )
            .unwrap();

        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        assert!(pool.cancel(&handle));
        // After cancellation the task is dropped on the next scan and no
        // further runs arrive once any in-flight execution settles.
        while rx.recv_timeout(Duration::from_millis(100)).is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        pool.shutdown();
    }

    #[test]
    fn cancel_before_wake_time_prevents_execution() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel::<()>();
        let handle = pool
            .schedule_in(
                TaskKind::StatSnapshot,
                Duration::from_millis(40),
                Box::new(move || {
                    let _ = tx.send(());
                    Ok(false)
                }),
            )
            .unwrap();
        assert!(pool.cancel(&handle));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        pool.shutdown();
    }

    #[test]
    fn task_failure_is_contained() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();
        pool.schedule(
            TaskKind::DiskFetch {
                key: "missing".into(),
                vbucket: 0,
            },
            Box::new(|| Err(CoreOperationError::io_failed("simulated disk failure"))),
        )
        .unwrap();
        // Same category, after the failing task: the worker survived.
        pool.schedule(
            TaskKind::DiskFetch {
                key: "present".into(),
                vbucket: 0,
            },
            Box::new(move || {
                let _ = tx.send(());
                Ok(false)
            }),
        )
        .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            pool.statistics().snapshot(TaskCategory::Reader).tasks_failed,
            1
        );
        pool.shutdown();
    }

    #[test]
    fn slow_task_produces_exactly_one_observation() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        // WorkloadMonitor expects to finish in 1ms; sleeping 30ms overruns.
        pool.schedule(
            TaskKind::WorkloadMonitor,
            Box::new(move || {
                std::thread::sleep(Duration::from_millis(30));
                let _ = tx.send(());
                Ok(false)
            }),
        )
        .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        // A fast task on the same category produces no observation.
        pool.schedule(
            TaskKind::BucketCreate { name: "fast".into() },
            Box::new(move || {
                let _ = tx2.send(());
                Ok(false)
            }),
        )
        .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let observations = pool.statistics().slow_tasks();
        assert_eq!(observations.len(), 1);
        let obs = &observations[0];
        assert_eq!(obs.category, TaskCategory::NonIo);
        assert_eq!(obs.description, "Monitoring a workload pattern");
        assert_eq!(obs.expected, Duration::from_millis(1));
        assert!(obs.actual >= Duration::from_millis(30));
        pool.shutdown();
    }

    #[test]
    fn resize_keeps_queued_tasks() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();
        pool.schedule_in(
            TaskKind::StatSnapshot,
            Duration::from_millis(40),
            Box::new(move || {
                let _ = tx.send(());
                Ok(false)
            }),
        )
        .unwrap();
        pool.resize_category(TaskCategory::Writer, 3).unwrap();
        assert_eq!(pool.thread_count(TaskCategory::Writer), 3);
        pool.resize_category(TaskCategory::Writer, 1).unwrap();
        assert_eq!(pool.thread_count(TaskCategory::Writer), 1);
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        pool.shutdown();
    }

    #[test]
    fn schedule_at_overrides_category_and_expectation() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();
        // StatSnapshot normally lands on Writer; pin it to AuxIo with a
        // tight expectation instead.
        pool.schedule_at(
            TaskCategory::AuxIo,
            Instant::now(),
            Duration::from_millis(1),
            TaskKind::StatSnapshot,
            Box::new(move || {
                std::thread::sleep(Duration::from_millis(20));
                let _ = tx.send(());
                Ok(false)
            }),
        )
        .unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(pool.statistics().snapshot(TaskCategory::AuxIo).tasks_run, 1);
        assert_eq!(pool.statistics().snapshot(TaskCategory::Writer).tasks_run, 0);
        assert_eq!(
            pool.statistics().snapshot(TaskCategory::AuxIo).slow_tasks,
            1
        );
        pool.shutdown();
    }

    #[test]
    fn schedule_after_shutdown_is_refused() {
        let pool = small_pool();
        pool.shutdown();
        let err = pool
            .schedule(TaskKind::StatSnapshot, Box::new(|| Ok(false)))
            .unwrap_err();
        assert_eq!(err, CoreOperationError::ShuttingDown);
    }
}
