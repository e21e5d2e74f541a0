//! Audit event records

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One audit trail entry.
///
/// Producers supply the event id and a JSON payload; the timestamp is
/// stamped at creation so queueing delay never skews the recorded time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Numeric event id from the audit descriptor set
    pub id: u32,
    /// Milliseconds since the Unix epoch at creation time
    pub timestamp_ms: u64,
    /// Event-specific fields
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(id: u32, payload: serde_json::Value) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            id,
            timestamp_ms,
            payload,
        }
    }
}
