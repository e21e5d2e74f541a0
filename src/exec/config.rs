//! Executor core configuration
//!
//! Startup configuration for the worker pools, slow-task observability
//! and the audit subsystem. All values are supplied once at build time;
//! worker thread counts can additionally be re-applied at runtime through
//! `ExecutorPool::resize_category` without losing in-flight tasks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::task::TaskCategory;
use super::types::CoreOperationError;

/// Configuration for the executor core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Worker threads servicing disk-write style tasks
    pub writer_threads: usize,
    /// Worker threads servicing disk-read style tasks
    pub reader_threads: usize,
    /// Worker threads for auxiliary I/O (access log, stat snapshots)
    pub auxio_threads: usize,
    /// Worker threads for CPU-only work
    pub nonio_threads: usize,
    /// Maximum retained slow-task observations
    pub slow_task_log_capacity: usize,
    /// Audit subsystem configuration
    pub audit: AuditConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            writer_threads: 4,
            reader_threads: 4,
            auxio_threads: 2,
            nonio_threads: 2,
            slow_task_log_capacity: 128,
            audit: AuditConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Configured thread count for one worker category
    #[inline(always)]
    pub fn thread_count(&self, category: TaskCategory) -> usize {
        match category {
            TaskCategory::Writer => self.writer_threads,
            TaskCategory::Reader => self.reader_threads,
            TaskCategory::AuxIo => self.auxio_threads,
            TaskCategory::NonIo => self.nonio_threads,
        }
    }

    /// Validate the configuration before any threads are spawned.
    ///
    /// Every category needs at least one thread: a category with zero
    /// workers would silently strand submitted tasks.
    pub fn validate(&self) -> Result<(), CoreOperationError> {
        for category in TaskCategory::ALL {
            if self.thread_count(category) == 0 {
                return Err(CoreOperationError::invalid_configuration(format!(
                    "{} thread count must be at least 1",
                    category
                )));
            }
        }
        if self.audit.max_queue_depth == 0 {
            return Err(CoreOperationError::invalid_configuration(
                "audit queue depth must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Audit subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit events are collected at all
    pub enabled: bool,
    /// Maximum queued events before producers see drops
    pub max_queue_depth: usize,
    /// Target file for the JSON-lines audit trail (None = in-memory sink
    /// supplied by the caller)
    pub log_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_queue_depth: 50_000,
            log_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_threads_rejected() {
        let mut config = CoreConfig::default();
        config.reader_threads = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CoreOperationError::InvalidConfiguration(_)));
    }

    #[test]
    fn zero_audit_depth_rejected() {
        let mut config = CoreConfig::default();
        config.audit.max_queue_depth = 0;
        assert!(config.validate().is_err());
    }
}
