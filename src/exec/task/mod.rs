//! Deferred work units for the executor pool
//!
//! A [`Task`] is one unit of deferred work: a kind tag, a submission
//! sequence number, a wake time, an expected-maximum duration used only
//! for slow-task observability, and the work closure itself. The former
//! per-kind class hierarchy is collapsed into the [`TaskKind`] tagged
//! variant dispatched through a single execution entry point.

pub(crate) mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_utils::atomic::AtomicCell;
use parking_lot::Mutex;

use super::types::CoreOperationError;

/// Work closure executed by a worker thread.
///
/// Returns `Ok(true)` to be rescheduled (periodic tasks), `Ok(false)`
/// when finished. Failures are returned, never unwound: an error must not
/// cross the worker thread boundary, so the pool captures it, logs it
/// with the task identity, and marks the task completed.
pub type TaskFn = Box<dyn FnMut() -> Result<bool, CoreOperationError> + Send>;

/// Worker category a task is scheduled onto.
///
/// Separate queues and thread pools per category keep cheap
/// high-frequency work (stat snapshots) from starving behind slow disk
/// tasks, and let capacity be tuned per resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TaskCategory {
    /// Disk write / flush tasks
    Writer,
    /// Disk read / fetch tasks
    Reader,
    /// Auxiliary I/O (stat snapshots, access log, audit reconfigure)
    AuxIo,
    /// CPU-only work (bucket lifecycle, workload monitoring)
    NonIo,
}

impl TaskCategory {
    /// All categories, in queue index order
    pub const ALL: [TaskCategory; 4] = [
        TaskCategory::Writer,
        TaskCategory::Reader,
        TaskCategory::AuxIo,
        TaskCategory::NonIo,
    ];

    /// Stable queue index for per-category arrays
    #[inline(always)]
    pub(crate) fn index(self) -> usize {
        match self {
            TaskCategory::Writer => 0,
            TaskCategory::Reader => 1,
            TaskCategory::AuxIo => 2,
            TaskCategory::NonIo => 3,
        }
    }

    /// Thread-name friendly label
    pub fn label(self) -> &'static str {
        match self {
            TaskCategory::Writer => "writer",
            TaskCategory::Reader => "reader",
            TaskCategory::AuxIo => "auxio",
            TaskCategory::NonIo => "nonio",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Kind tag identifying what a task does.
///
/// Carries the per-kind parameters needed for a useful description, the
/// default worker category, and the default expected-maximum duration.
/// The expected durations are observability thresholds only; nothing is
/// ever preempted for exceeding one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Persist dirty items for one shard to disk
    DiskFlush { shard: u16 },
    /// Fetch a non-resident item from disk
    DiskFetch { key: String, vbucket: u16 },
    /// Periodically snapshot statistics to disk
    StatSnapshot,
    /// Monitor whether the workload is read-heavy, write-heavy or mixed
    WorkloadMonitor,
    /// Create a bucket and bring its engine online
    BucketCreate { name: String },
    /// Tear down a bucket and release its resources
    BucketDestroy { name: String },
    /// Re-read the audit configuration file
    AuditReconfigure,
}

impl TaskKind {
    /// Default worker category for this kind
    pub fn category(&self) -> TaskCategory {
        match self {
            TaskKind::DiskFlush { .. } => TaskCategory::Writer,
            TaskKind::DiskFetch { .. } => TaskCategory::Reader,
            TaskKind::StatSnapshot => TaskCategory::Writer,
            TaskKind::WorkloadMonitor => TaskCategory::NonIo,
            TaskKind::BucketCreate { .. } => TaskCategory::NonIo,
            TaskKind::BucketDestroy { .. } => TaskCategory::NonIo,
            TaskKind::AuditReconfigure => TaskCategory::AuxIo,
        }
    }

    /// Expected-maximum duration; executions beyond this are flagged as
    /// slow. Disk task durations vary widely with document counts and
    /// disk capacity, so those thresholds are generous: they should
    /// record significantly slow executions without creating log noise.
    pub fn expected_duration(&self) -> Duration {
        match self {
            TaskKind::DiskFlush { .. } => Duration::from_millis(400),
            TaskKind::DiskFetch { .. } => Duration::from_millis(700),
            TaskKind::StatSnapshot => Duration::from_millis(250),
            // Lookup of a few counters; p99.9 is well under a millisecond.
            TaskKind::WorkloadMonitor => Duration::from_millis(1),
            TaskKind::BucketCreate { .. } => Duration::from_secs(10),
            TaskKind::BucketDestroy { .. } => Duration::from_secs(10),
            TaskKind::AuditReconfigure => Duration::from_millis(100),
        }
    }

    /// Human-readable description used in logs and slow-task records
    pub fn description(&self) -> String {
        match self {
            TaskKind::DiskFlush { shard } => format!("Running a flusher loop: shard {}", shard),
            TaskKind::DiskFetch { key, vbucket } => {
                format!("Fetching item from disk: key{{{}}}, vb:{}", key, vbucket)
            }
            TaskKind::StatSnapshot => "Updating stat snapshot on disk".to_string(),
            TaskKind::WorkloadMonitor => "Monitoring a workload pattern".to_string(),
            TaskKind::BucketCreate { name } => format!("Creating bucket [{}]", name),
            TaskKind::BucketDestroy { name } => format!("Destroying bucket [{}]", name),
            TaskKind::AuditReconfigure => "Reconfiguring audit daemon".to_string(),
        }
    }
}

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed but not yet queued
    Idle,
    /// Queued and eligible (or waiting for its wake time)
    Runnable,
    /// Currently executing on a worker thread
    Running,
    /// Finished; the pool has released ownership
    Completed,
    /// Periodic task between completion and its next wake time
    Rescheduled,
    /// Cancelled before execution; dropped on the next queue scan
    Cancelled,
}

/// One unit of deferred work owned by the executor pool.
///
/// The pool holds the `Arc<Task>` from submission until the task reaches
/// a terminal state; submitters keep only a [`TaskHandle`]. Identity
/// (kind + seq) is stable across reschedules.
pub struct Task {
    kind: TaskKind,
    seq: u64,
    category: TaskCategory,
    expected_duration: Duration,
    /// Reschedule interval for periodic tasks
    period: Option<Duration>,
    wake_time: AtomicCell<Instant>,
    state: AtomicCell<TaskState>,
    cancelled: AtomicBool,
    run: Mutex<TaskFn>,
}

impl Task {
    pub(crate) fn new(
        kind: TaskKind,
        seq: u64,
        category: TaskCategory,
        wake_time: Instant,
        expected_duration: Duration,
        period: Option<Duration>,
        run: TaskFn,
    ) -> Self {
        Self {
            kind,
            seq,
            category,
            expected_duration,
            period,
            wake_time: AtomicCell::new(wake_time),
            state: AtomicCell::new(TaskState::Idle),
            cancelled: AtomicBool::new(false),
            run: Mutex::new(run),
        }
    }

    /// Kind tag of this task
    #[inline(always)]
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Submission sequence number (stable across reschedules)
    #[inline(always)]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Worker category this task is queued on
    #[inline(always)]
    pub fn category(&self) -> TaskCategory {
        self.category
    }

    /// Slow-task threshold for this execution
    #[inline(always)]
    pub fn expected_duration(&self) -> Duration {
        self.expected_duration
    }

    /// Reschedule interval, if periodic
    #[inline(always)]
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Earliest time this task may run
    #[inline(always)]
    pub fn wake_time(&self) -> Instant {
        self.wake_time.load()
    }

    pub(crate) fn set_wake_time(&self, wake: Instant) {
        self.wake_time.store(wake);
    }

    /// Current lifecycle state
    #[inline(always)]
    pub fn state(&self) -> TaskState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state);
    }

    /// Request cancellation. The task is never executed afterwards; the
    /// owning queue drops it on its next scan.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested
    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Single execution entry point: runs the work closure once.
    pub(crate) fn execute(&self) -> Result<bool, CoreOperationError> {
        let mut run = self.run.lock();
        (run)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("seq", &self.seq)
            .field("category", &self.category)
            .field("state", &self.state.load())
            .finish()
    }
}

/// Back-reference to a scheduled task: identity plus a weak cancel
/// reference.
///
/// Handles never keep a task alive: the pool may outlive the connection
/// that submitted the task, and equally the task may be released while
/// a handle is still held.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    kind: TaskKind,
    seq: u64,
    task: Weak<Task>,
}

impl TaskHandle {
    pub(crate) fn new(task: &Arc<Task>) -> Self {
        Self {
            kind: task.kind.clone(),
            seq: task.seq,
            task: Arc::downgrade(task),
        }
    }

    /// Kind of the referenced task
    #[inline(always)]
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Sequence number of the referenced task
    #[inline(always)]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether the pool still owns the referenced task
    pub fn is_live(&self) -> bool {
        self.task.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<Task>> {
        self.task.upgrade()
    }
}
