//! Tidepool - concurrency core for a persistent key-value server
//!
//! The hand-off machinery between network-facing request threads and
//! background workers: categorized worker pools executing deferred work,
//! a suspend/resume protocol for commands that start asynchronous
//! operations, and a bounded audit event queue with a single serializing
//! consumer.
//!
//! # Features
//!
//! - **Categorized worker pools**: independent writer/reader/auxio/nonio
//!   queues and thread sets, so cheap high-frequency work never starves
//!   behind slow disk tasks
//! - **Wake-time scheduling**: delayed and periodic tasks with stable
//!   identity across reschedules
//! - **Slow-task observability**: per-task duration expectations flag
//!   anomalously slow executions without ever preempting them
//! - **Suspend/resume commands**: explicit state machines park the
//!   connection on would-block and resume from a worker's notification
//! - **Liveness-checked notifications**: generation-tagged cookie
//!   handles make stale wakeups a counted no-op, never a dangling
//!   reference
//! - **Bounded audit queue**: producers never block; overflow is a
//!   counted drop, shutdown drains everything queued

// Public API modules
pub mod prelude;
pub mod tidepool;

// Core implementation modules
pub mod audit;
pub mod exec;
pub mod telemetry;

// Re-export the public API at the crate root for convenience
pub use audit::{AuditDaemon, AuditEvent, AuditSink, BoundedEventQueue, FileAuditSink};
pub use exec::command::CommandContext;
pub use exec::config::{AuditConfig, CoreConfig};
pub use exec::connection::{Connection, ConnectionState};
pub use exec::notify::{Cookie, CookieHandle, CookieRegistry};
pub use exec::pool::{ExecutorPool, PoolStatistics, SlowTaskObservation};
pub use exec::task::{TaskCategory, TaskFn, TaskHandle, TaskKind, TaskState};
pub use exec::types::{CoreOperationError, EngineStatus};
pub use telemetry::CoreStatsSnapshot;
pub use tidepool::{Tidepool, TidepoolBuilder};
