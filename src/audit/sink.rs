//! Audit event sinks
//!
//! The consumer thread hands each drained event to a sink. Sinks may
//! block (disk writes); they run outside the queue lock.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::event::AuditEvent;
use crate::exec::types::CoreOperationError;

/// Destination for drained audit events
pub trait AuditSink: Send {
    /// Durably record one event
    fn write_event(&mut self, event: &AuditEvent) -> Result<(), CoreOperationError>;
}

/// JSON-lines audit trail on disk
pub struct FileAuditSink {
    writer: BufWriter<File>,
}

impl FileAuditSink {
    /// Open (or create) the audit trail file in append mode.
    pub fn open(path: &Path) -> Result<Self, CoreOperationError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| {
                CoreOperationError::io_failed(format!(
                    "open error on file {}: {}",
                    path.display(),
                    err
                ))
            })?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn write_event(&mut self, event: &AuditEvent) -> Result<(), CoreOperationError> {
        serde_json::to_writer(&mut self.writer, event)
            .map_err(|err| CoreOperationError::io_failed(err.to_string()))?;
        self.writer.write_all(b"\n")?;
        // Flush per event: the audit trail must survive an unclean exit.
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn writes_parseable_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let mut sink = FileAuditSink::open(&path).unwrap();
        sink.write_event(&AuditEvent::new(1, serde_json::json!({"op": "login"})))
            .unwrap();
        sink.write_event(&AuditEvent::new(2, serde_json::json!({"op": "logout"})))
            .unwrap();
        drop(sink);

        let file = std::fs::File::open(&path).unwrap();
        let events: Vec<AuditEvent> = std::io::BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, 1);
        assert_eq!(events[1].payload["op"], "logout");
    }
}
