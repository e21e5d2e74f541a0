//! Simple public API for the Tidepool concurrency core
//!
//! This provides a user-friendly facade over the executor pool, the
//! cookie registry and the audit daemon: build once at startup, hand
//! `Arc` views to the connection and engine layers, shut down once at
//! exit.

use std::path::PathBuf;
use std::sync::Arc;

use crate::audit::{AuditDaemon, AuditSink, FileAuditSink};
use crate::exec::config::CoreConfig;
use crate::exec::notify::CookieRegistry;
use crate::exec::pool::ExecutorPool;
use crate::exec::types::CoreOperationError;
use crate::telemetry::CoreStatsSnapshot;

/// The assembled concurrency core of the server.
///
/// Process-wide lifetime: created during startup (worker and consumer
/// thread spawn failures abort initialization), torn down during
/// shutdown with [`Tidepool::shutdown`].
pub struct Tidepool {
    pool: Arc<ExecutorPool>,
    cookies: Arc<CookieRegistry>,
    audit: Option<AuditDaemon>,
}

impl Tidepool {
    /// Start building a core with default configuration
    pub fn builder() -> TidepoolBuilder {
        TidepoolBuilder::new()
    }

    /// The background task executor
    pub fn pool(&self) -> &Arc<ExecutorPool> {
        &self.pool
    }

    /// The connection cookie registry
    pub fn cookies(&self) -> &Arc<CookieRegistry> {
        &self.cookies
    }

    /// The audit daemon, when one was configured
    pub fn audit(&self) -> Option<&AuditDaemon> {
        self.audit.as_ref()
    }

    /// Consolidated statistics snapshot
    pub fn stats(&self) -> CoreStatsSnapshot {
        let statistics = self.pool.statistics();
        CoreStatsSnapshot {
            categories: statistics.snapshot_all(),
            slow_tasks: statistics.slow_tasks(),
            live_cookies: self.cookies.len(),
            stale_notifications: self.cookies.stale_notification_count(),
            audit_written: self.audit.as_ref().map_or(0, |a| a.written_events()),
            audit_dropped: self.audit.as_ref().map_or(0, |a| a.dropped_events()),
            audit_write_failures: self.audit.as_ref().map_or(0, |a| a.write_failures()),
        }
    }

    /// Graceful shutdown: drain the audit queue, then stop the worker
    /// pools and join every thread.
    pub fn shutdown(mut self) {
        if let Some(audit) = self.audit.take() {
            audit.shutdown();
        }
        self.pool.shutdown();
    }
}

impl std::fmt::Debug for Tidepool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tidepool")
            .field("pool", &self.pool)
            .field("cookies", &self.cookies)
            .finish()
    }
}

/// Fluent configuration for [`Tidepool`]
pub struct TidepoolBuilder {
    config: CoreConfig,
    audit_sink: Option<Box<dyn AuditSink>>,
}

impl TidepoolBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
            audit_sink: None,
        }
    }

    /// Set the writer category thread count
    pub fn writer_threads(mut self, count: usize) -> Self {
        self.config.writer_threads = count;
        self
    }

    /// Set the reader category thread count
    pub fn reader_threads(mut self, count: usize) -> Self {
        self.config.reader_threads = count;
        self
    }

    /// Set the auxiliary I/O category thread count
    pub fn auxio_threads(mut self, count: usize) -> Self {
        self.config.auxio_threads = count;
        self
    }

    /// Set the CPU-only category thread count
    pub fn nonio_threads(mut self, count: usize) -> Self {
        self.config.nonio_threads = count;
        self
    }

    /// Set how many slow-task observations are retained
    pub fn slow_task_log_capacity(mut self, capacity: usize) -> Self {
        self.config.slow_task_log_capacity = capacity;
        self
    }

    /// Enable or disable audit event collection
    pub fn audit_enabled(mut self, enabled: bool) -> Self {
        self.config.audit.enabled = enabled;
        self
    }

    /// Set the audit queue depth before producers see drops
    pub fn audit_max_queue_depth(mut self, depth: usize) -> Self {
        self.config.audit.max_queue_depth = depth;
        self
    }

    /// Write the audit trail to a JSON-lines file at `path`
    pub fn audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.audit.log_path = Some(path.into());
        self
    }

    /// Use a custom audit sink instead of a file
    pub fn audit_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Spawn worker pools and the audit consumer.
    ///
    /// Without a sink or log path the audit subsystem is not started at
    /// all; `put_event` callers go through [`Tidepool::audit`] and see
    /// `None`.
    pub fn build(self) -> Result<Tidepool, CoreOperationError> {
        self.config.validate()?;

        let pool = Arc::new(ExecutorPool::new(&self.config)?);
        let cookies = Arc::new(CookieRegistry::new());

        let sink: Option<Box<dyn AuditSink>> = match self.audit_sink {
            Some(sink) => Some(sink),
            None => match &self.config.audit.log_path {
                Some(path) => Some(Box::new(FileAuditSink::open(path)?)),
                None => None,
            },
        };
        let audit = match sink {
            Some(sink) => {
                let daemon = AuditDaemon::start(&self.config.audit, sink);
                match daemon {
                    Ok(daemon) => Some(daemon),
                    Err(err) => {
                        pool.shutdown();
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        Ok(Tidepool {
            pool,
            cookies,
            audit,
        })
    }
}

impl Default for TidepoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
