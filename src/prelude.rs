//! Tidepool prelude - convenient imports for users
//!
//! Everything the connection, engine and audit layers need to work with
//! the concurrency core.

// Re-export the public API
pub use crate::tidepool::{Tidepool, TidepoolBuilder};

// Core status and error surface
pub use crate::exec::types::{CoreOperationError, EngineStatus};

// Task scheduling surface
pub use crate::exec::pool::{ExecutorPool, SlowTaskObservation};
pub use crate::exec::task::{TaskCategory, TaskFn, TaskHandle, TaskKind, TaskState};

// Suspend/resume surface
pub use crate::exec::command::bucket::{BucketCommandContext, BucketOp, BucketRequest, BucketWork};
pub use crate::exec::command::buffer_ack::{AckEngineOp, BufferAckContext};
pub use crate::exec::command::CommandContext;
pub use crate::exec::connection::{Connection, ConnectionState};
pub use crate::exec::notify::{Cookie, CookieHandle, CookieRegistry};

// Audit surface
pub use crate::audit::{AuditDaemon, AuditEvent, AuditSink, FileAuditSink};
