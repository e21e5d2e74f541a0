//! Status codes and error types for the executor core
//!
//! This module contains the engine status surface shared between command
//! contexts, cookies, and workers, plus the rich operation error used for
//! everything that is not a per-command status.

/// Engine status codes exchanged between command contexts, cookies and
/// workers.
///
/// This is the value stored in a cookie's asynchronous result slot, the
/// value returned from `CommandContext::step()`, and the value written as
/// a command response. `WouldBlock` and `Disconnect` are control-flow
/// signals; everything else maps to a protocol status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    /// Operation completed successfully
    Success,
    /// Asynchronous work was started; the connection must suspend
    WouldBlock,
    /// The connection must be torn down
    Disconnect,
    /// Requested key does not exist
    KeyNotFound,
    /// Request payload failed validation
    InvalidArguments,
    /// Allocation failed while servicing the request
    NoMemory,
    /// Transient resource shortage; the client should retry later
    TemporaryFailure,
    /// The server is overloaded and shedding work
    TooBusy,
    /// Internal invariant violation surfaced as a status
    InternalFailure,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineStatus::Success => "success",
            EngineStatus::WouldBlock => "would block",
            EngineStatus::Disconnect => "disconnect",
            EngineStatus::KeyNotFound => "key not found",
            EngineStatus::InvalidArguments => "invalid arguments",
            EngineStatus::NoMemory => "out of memory",
            EngineStatus::TemporaryFailure => "temporary failure",
            EngineStatus::TooBusy => "too busy",
            EngineStatus::InternalFailure => "internal failure",
        };
        write!(f, "{}", name)
    }
}

impl EngineStatus {
    /// True for statuses that represent a finished command (anything that
    /// is not a suspension or teardown signal).
    #[inline(always)]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineStatus::WouldBlock | EngineStatus::Disconnect)
    }
}

/// Operation error for the executor core.
///
/// Combines easy pattern matching with enough metadata to decide whether
/// an operation is worth retrying. Statuses crossing the command boundary
/// use [`EngineStatus`]; this type covers everything else (startup,
/// scheduling, audit I/O).
#[derive(Debug, Clone, PartialEq)]
pub enum CoreOperationError {
    /// Worker or consumer threads could not be created at startup
    InitializationFailed(String),
    /// A queue or pool refused work because a limit was reached
    ResourceExhausted(String),
    /// The component is shutting down and no longer accepts work
    ShuttingDown,
    /// Configuration failed validation
    InvalidConfiguration(String),
    /// An internal state machine was driven out of order
    InvalidState(String),
    /// Underlying I/O failure (audit sink, stat snapshot)
    Io(String),
    /// Task execution reported a failure
    TaskFailed(String),
}

impl std::fmt::Display for CoreOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreOperationError::InitializationFailed(msg) => {
                write!(f, "initialization failed: {}", msg)
            }
            CoreOperationError::ResourceExhausted(msg) => {
                write!(f, "resource exhausted: {}", msg)
            }
            CoreOperationError::ShuttingDown => write!(f, "shutting down"),
            CoreOperationError::InvalidConfiguration(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            CoreOperationError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            CoreOperationError::Io(msg) => write!(f, "I/O error: {}", msg),
            CoreOperationError::TaskFailed(msg) => write!(f, "task failed: {}", msg),
        }
    }
}

impl std::error::Error for CoreOperationError {}

impl CoreOperationError {
    /// Create an initialization error
    #[inline(always)]
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a resource exhaustion error
    #[inline(always)]
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Create a configuration error
    #[inline(always)]
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an invalid state error
    #[inline(always)]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an I/O error
    #[inline(always)]
    pub fn io_failed(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a task failure error
    #[inline(always)]
    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Check if the failed operation can be retried as-is
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            CoreOperationError::ResourceExhausted(_)
                | CoreOperationError::Io(_)
                | CoreOperationError::TaskFailed(_)
        )
    }

    /// Map an operation error to the status surfaced across the command
    /// boundary. Resource exhaustion becomes a "try later" signal rather
    /// than an unhandled fault (allocation-style failures must never
    /// cross the connection's main loop).
    pub fn as_engine_status(&self) -> EngineStatus {
        match self {
            CoreOperationError::ResourceExhausted(_) => EngineStatus::NoMemory,
            CoreOperationError::ShuttingDown => EngineStatus::TemporaryFailure,
            CoreOperationError::InvalidConfiguration(_) => EngineStatus::InvalidArguments,
            _ => EngineStatus::TemporaryFailure,
        }
    }
}

impl From<std::io::Error> for CoreOperationError {
    fn from(err: std::io::Error) -> Self {
        CoreOperationError::Io(err.to_string())
    }
}
